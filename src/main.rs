use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use script_host::config::EngineConfig;
use script_host::host::chunk_name_for;
use script_host::platform::{
    Console, DiskFiles, FileSource, HeadlessAudio, HeadlessGraphics, StdConsole, TracingSink,
};
use script_host::{HostIo, InterpreterHost, KeyState, Scene, SceneIo, SceneState};

const FRAME_TIME: Duration = Duration::from_micros(16_667);

#[derive(Debug, Parser)]
#[command(
    name = "script-host",
    version,
    about = "Sandboxed Lua scene host with a breakpoint debugger"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scene script headlessly
    Run(RunArgs),
    /// Compile a script without running it
    Check {
        script: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Entry script, relative to the asset root
    script: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable the interactive debugger
    #[arg(long)]
    debug: bool,

    /// Do not stop on entry when debugging
    #[arg(long)]
    no_break_on_entry: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// update() calls per frame
    #[arg(long)]
    speed: Option<u32>,

    #[arg(long)]
    instruction_limit: Option<u32>,

    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Interpreter heap limit in bytes
    #[arg(long)]
    max_heap: Option<usize>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run(args),
        Command::Check { script } => check(&script),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &RunArgs) -> Result<EngineConfig, String> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };

    config.scene.script = args.script.clone();
    if let Some(root) = &args.asset_root {
        config.scene.asset_root = root.clone();
    }
    if args.debug {
        config.host.debug = true;
    }
    if args.no_break_on_entry {
        config.host.break_on_entry = false;
    }
    if let Some(speed) = args.speed {
        config.scene.speed = speed;
    }
    if let Some(limit) = args.instruction_limit {
        config.host.instruction_limit = limit;
    }
    if let Some(max_heap) = args.max_heap {
        config.host.max_heap_bytes = max_heap;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn run(args: RunArgs) -> Result<(), String> {
    let config = load_config(&args)?;
    let asset_root = config.scene.asset_root.clone();
    let script_path = asset_root.join(&config.scene.script);

    let io = SceneIo {
        files: Arc::new(DiskFiles::new(&asset_root)),
        graphics: Arc::new(HeadlessGraphics::new()),
        audio: Arc::new(HeadlessAudio::new()),
        log: Rc::new(TracingSink),
        console: Box::new(|| Box::new(StdConsole::new()) as Box<dyn Console>),
    };

    info!(script = %script_path.display(), "starting scene");
    let mut scene = Scene::new(config.scene, config.host, io).map_err(|e| e.to_string())?;

    let keys = KeyState::new();
    let mut last_modified = modified_time(&script_path);
    let mut frame = 0u64;

    while args.frames.map_or(true, |limit| frame < limit) {
        let started = Instant::now();

        let modified = modified_time(&script_path);
        if modified.is_some() && modified != last_modified {
            info!(script = %script_path.display(), "script changed on disk");
            last_modified = modified;
            scene.request_reload();
        }

        scene.frame(&keys).map_err(|e| e.to_string())?;
        if frame == 0 && scene.state() == SceneState::Error {
            warn!("scene is in its error state; edit the script to reload");
        }
        frame += 1;

        if let Some(rest) = FRAME_TIME.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    scene.exit().map_err(|e| e.to_string())?;
    info!(frames = frame, "scene finished");
    Ok(())
}

fn check(script: &Path) -> Result<(), String> {
    let root = script.parent().unwrap_or(Path::new("."));
    let files: Arc<dyn FileSource> = Arc::new(DiskFiles::new(root));
    let source = fs::read(script).map_err(|e| format!("{}: {}", script.display(), e))?;

    let host = InterpreterHost::new(
        Default::default(),
        HostIo {
            files,
            console: Box::new(StdConsole::new()),
        },
    )
    .map_err(|e| e.to_string())?;

    host.compile(&chunk_name_for(script), &source)
        .map_err(|e| e.to_string())?;
    info!(script = %script.display(), "compiled cleanly");
    Ok(())
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
