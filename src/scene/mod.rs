//! Scene driver: runs one entry script through its lifecycle.
//!
//! `Loading` waits for the resource loader, `Ready` calls the script's entry
//! points every frame, `Error` holds the failure until a reload. Script faults
//! never escape a frame; only a fatal interpreter error does.

mod keys;

pub use keys::KeyState;

use std::rc::Rc;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bridge::{self, ScriptServices};
use crate::config::{HostConfig, SceneConfig};
use crate::error::{HostError, HostResult};
use crate::host::{CallMode, HostIo, InterpreterHost};
use crate::platform::{Audio, Console, FileSource, Graphics, LogSink};
use crate::resource::{LoadTask, ResourceManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Loading,
    Ready,
    Error,
}

/// Builds the debug console for each new interpreter.
pub type ConsoleFactory = Box<dyn FnMut() -> Box<dyn Console>>;

/// Collaborators a scene hands to the hosts and libraries it builds.
pub struct SceneIo {
    pub files: Arc<dyn FileSource>,
    pub graphics: Arc<dyn Graphics>,
    pub audio: Arc<dyn Audio>,
    pub log: Rc<dyn LogSink>,
    pub console: ConsoleFactory,
}

pub struct Scene {
    config: SceneConfig,
    host_config: HostConfig,
    io: SceneIo,
    resources: Arc<ResourceManager>,
    loader: Option<LoadTask>,
    host: Option<InterpreterHost>,
    state: SceneState,
    started: bool,
    reload_requested: bool,
    exited: bool,
    speed: u32,
    draw_suppressed: bool,
    last_error: Option<HostError>,
}

impl Scene {
    /// Build the scene and run its script's `load()`. Script failures leave
    /// the scene in [`SceneState::Error`]; only a fatal error is returned.
    pub fn new(config: SceneConfig, host_config: HostConfig, io: SceneIo) -> HostResult<Self> {
        let resources = Arc::new(ResourceManager::new(
            Arc::clone(&io.files),
            Arc::clone(&io.graphics),
            Arc::clone(&io.audio),
        ));
        let speed = config.speed.max(1);

        let mut scene = Self {
            config,
            host_config,
            io,
            resources,
            loader: None,
            host: None,
            state: SceneState::Loading,
            started: false,
            reload_requested: false,
            exited: false,
            speed,
            draw_suppressed: false,
            last_error: None,
        };

        let result = scene.setup();
        scene.absorb(result)?;
        Ok(scene)
    }

    /// Advance one frame.
    pub fn frame(&mut self, keys: &KeyState) -> HostResult<()> {
        if self.reload_requested {
            self.reload_requested = false;
            info!(script = %self.config.script.display(), "reloading scene");
            self.teardown();
            let result = self.setup();
            self.absorb(result)?;
        }

        if self.state == SceneState::Loading {
            let result = self.poll_loader();
            self.absorb(result)?;
        }

        if self.state == SceneState::Ready {
            let result = self.run_entry_points(keys);
            self.absorb(result)?;
        }

        Ok(())
    }

    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    /// Call the script's `exit()` once. Later calls do nothing.
    pub fn exit(&mut self) -> HostResult<()> {
        if self.exited {
            return Ok(());
        }
        self.exited = true;

        let result = match &self.host {
            Some(host) if host.has_global_function("exit") => {
                host.call_global_function::<_, ()>("exit", self.host_config.instruction_limit, ())
            }
            _ => Ok(()),
        };
        self.absorb(result)
    }

    /// `update` calls per frame, at least one.
    pub fn set_speed(&mut self, speed: u32) {
        self.speed = speed.max(1);
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn set_draw_suppressed(&mut self, suppressed: bool) {
        self.draw_suppressed = suppressed;
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn host(&self) -> Option<&InterpreterHost> {
        self.host.as_ref()
    }

    pub fn last_error(&self) -> Option<&HostError> {
        self.last_error.as_ref()
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    fn setup(&mut self) -> HostResult<()> {
        self.state = SceneState::Loading;
        self.started = false;
        self.last_error = None;

        let host = InterpreterHost::new(
            self.host_config.clone(),
            HostIo {
                files: Arc::clone(&self.io.files),
                console: (self.io.console)(),
            },
        )?;
        let services = Rc::new(ScriptServices {
            resources: Arc::clone(&self.resources),
            graphics: Arc::clone(&self.io.graphics),
            audio: Arc::clone(&self.io.audio),
            log: Rc::clone(&self.io.log),
        });
        bridge::install(&host, services)?;
        host.load_file(&self.config.script, None, CallMode::Protected)?;
        let host = self.host.insert(host);

        if host.has_global_function("load") {
            self.resources.unseal();
            let loaded = host.call_global_function::<_, ()>(
                "load",
                self.host_config.instruction_limit,
                (),
            );
            self.resources.seal();
            loaded?;
        }

        let sets = self.resources.set_ids();
        info!(script = %self.config.script.display(), sets = sets.len(), "scene loaded");
        self.loader = Some(LoadTask::spawn(Arc::clone(&self.resources), sets)?);
        Ok(())
    }

    fn poll_loader(&mut self) -> HostResult<()> {
        let finished = match self.loader.as_mut() {
            Some(task) => match task.poll() {
                None => return Ok(()),
                Some(result) => result,
            },
            None => Ok(0),
        };
        self.loader = None;

        let loaded = finished?;
        info!(loaded, "resources ready");
        self.state = SceneState::Ready;
        Ok(())
    }

    fn run_entry_points(&mut self, keys: &KeyState) -> HostResult<()> {
        let Some(host) = self.host.as_ref() else {
            return Ok(());
        };
        let limit = self.host_config.instruction_limit;

        if !self.started {
            self.started = true;
            if host.has_global_function("start") {
                host.call_global_function::<_, ()>("start", limit, ())?;
            }
        }

        if host.has_global_function("update") {
            let update_limit = self.config.update_instruction_limit.unwrap_or(limit);
            for _ in 0..self.speed {
                host.call_global_function::<_, ()>("update", update_limit, keys.clone())?;
            }
        }

        if !self.draw_suppressed && host.has_global_function("draw") {
            let draw_limit = self.config.draw_instruction_limit.unwrap_or(limit);
            host.call_global_function::<_, ()>("draw", draw_limit, ())?;
        }
        Ok(())
    }

    /// Recoverable failures move the scene to `Error`; fatal ones propagate.
    fn absorb(&mut self, result: HostResult<()>) -> HostResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if !err.is_recoverable() => Err(err),
            Err(err) => {
                self.fail(err);
                Ok(())
            }
        }
    }

    fn fail(&mut self, err: HostError) {
        self.loader = None;
        self.host = None;
        error!(script = %self.config.script.display(), "scene error: {}", err);
        if let Some(traceback) = err.traceback() {
            error!("{}", traceback);
        }
        self.state = SceneState::Error;
        self.last_error = Some(err);
    }

    fn teardown(&mut self) {
        if let Some(task) = self.loader.take() {
            task.cancel();
        }
        self.host = None;
        if let Err(e) = self.resources.clear() {
            warn!("failed to release scene resources: {}", e);
        }
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.teardown();
    }
}
