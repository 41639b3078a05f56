//! Host capabilities exposed to scripts as the `trace`, `resource`, `graph`
//! and `sound` library tables. Every table shares one [`ScriptServices`]
//! context.

mod libs;

use std::rc::Rc;
use std::sync::Arc;

use mlua::MultiValue;

use crate::error::HostResult;
use crate::host::InterpreterHost;
use crate::platform::{Audio, Graphics, LogSink, Transform};
use crate::resource::{ResourceError, ResourceManager, ResourceSpec};

/// Everything script-facing library functions may touch.
pub struct ScriptServices {
    pub resources: Arc<ResourceManager>,
    pub graphics: Arc<dyn Graphics>,
    pub audio: Arc<dyn Audio>,
    pub log: Rc<dyn LogSink>,
}

impl ScriptServices {
    pub fn write_trace(&self, line: &str) {
        self.log.write(line);
    }

    pub fn add_resource(
        &self,
        set: u32,
        id: &str,
        spec: ResourceSpec,
    ) -> Result<(), ResourceError> {
        self.resources.register(set, id, spec)
    }

    pub fn texture_size(&self, set: u32, id: &str) -> Result<(u32, u32), ResourceError> {
        let texture = self.resources.texture(set, id)?;
        // A loaded texture always has a size; treat a missing one as unloaded.
        self.graphics
            .texture_size(texture)
            .ok_or_else(|| ResourceError::NotLoaded(id.to_string()))
    }

    pub fn draw_texture(
        &self,
        set: u32,
        id: &str,
        transform: Transform,
    ) -> Result<(), ResourceError> {
        let texture = self.resources.texture(set, id)?;
        self.graphics.draw_texture(texture, transform);
        Ok(())
    }

    pub fn draw_string(
        &self,
        set: u32,
        font_id: &str,
        text: &str,
        x: f32,
        y: f32,
        color: u32,
    ) -> Result<(), ResourceError> {
        let font = self.resources.font(set, font_id)?;
        self.graphics.draw_string(font, text, x, y, color);
        Ok(())
    }

    pub fn play_sound_effect(&self, set: u32, id: &str) -> Result<(), ResourceError> {
        let sound = self.resources.sound_effect(set, id)?;
        self.audio.play_sound_effect(sound);
        Ok(())
    }

    pub fn play_bgm(&self, set: u32, id: &str) -> Result<(), ResourceError> {
        let bgm = self.resources.bgm(set, id)?;
        self.audio.play_bgm(bgm);
        Ok(())
    }

    pub fn stop_bgm(&self) {
        self.audio.stop_bgm();
    }
}

/// Register the script libraries on `host` and point `print` at `trace:write`.
pub fn install(host: &InterpreterHost, services: Rc<ScriptServices>) -> HostResult<()> {
    host.load_library("trace", libs::TRACE, Some(Rc::clone(&services)))?;
    host.load_library("resource", libs::RESOURCE, Some(Rc::clone(&services)))?;
    host.load_library("graph", libs::GRAPH, Some(Rc::clone(&services)))?;
    host.load_library("sound", libs::SOUND, Some(Rc::clone(&services)))?;

    let lua = host.lua();
    let print = lua.create_function(move |lua, args: MultiValue| {
        libs::trace_write(lua, &services, args)
    })?;
    lua.globals().raw_set("print", print)?;
    Ok(())
}
