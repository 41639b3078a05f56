//! The interpreter host: one Lua state living entirely inside a bounded heap.
//!
//! Everything the scripts can reach goes through here. Chunks are loaded as
//! text only, every entry into script code runs under the debug hook with an
//! instruction budget, and failures come back as [`HostError`] values.

mod library;
mod protected;

pub use library::BoundFn;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::ffi::{c_int, c_void, CStr};
use std::mem::ManuallyDrop;
use std::path::{Component, Path};
use std::rc::Rc;
use std::sync::Arc;

use mlua::{
    ffi, ChunkMode, FromLua, FromLuaMulti, Function, IntoLuaMulti, Lua, MultiValue, StdLib, Value,
};
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;
use crate::debugger::{active_lines, Debugger};
use crate::error::{HostError, HostResult};
use crate::heap::{lua_alloc, BoundedHeap, HeapStats};
use crate::platform::{Console, FileSource};
use protected::TracebackSlot;

/// Globals removed from every interpreter before any script runs.
const STRIPPED_GLOBALS: &[&str] = &[
    "dofile",
    "loadfile",
    "load",
    "loadstring",
    "require",
    "print",
];

/// How a freshly loaded chunk is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Failures come back as recoverable errors.
    Protected,
    /// Startup code. Any failure is fatal for the host.
    Unprotected,
}

/// Collaborators an interpreter host talks to directly.
pub struct HostIo {
    pub files: Arc<dyn FileSource>,
    pub console: Box<dyn Console>,
}

/// Handles into the state. Dropped before the state is closed.
struct Runtime {
    xpcall: Function,
    message_handler: Function,
    lua: Lua,
}

pub struct InterpreterHost {
    runtime: ManuallyDrop<Runtime>,
    state: *mut ffi::lua_State,
    traceback: TracebackSlot,
    debugger: Debugger,
    files: Arc<dyn FileSource>,
    instruction_limit: u32,
    // Declared last: the state's memory belongs to the heap.
    heap: Box<BoundedHeap>,
}

impl Drop for InterpreterHost {
    fn drop(&mut self) {
        // SAFETY: `runtime` is not touched again, and nothing else holds a
        // handle into the state once it is gone.
        unsafe {
            ManuallyDrop::drop(&mut self.runtime);
            ffi::lua_close(self.state);
        }
        debug!(peak = self.heap.stats().peak, "interpreter closed");
    }
}

unsafe extern "C-unwind" fn on_lua_panic(state: *mut ffi::lua_State) -> c_int {
    let message = {
        let raw = ffi::lua_tostring(state, -1);
        if raw.is_null() {
            "(error object is not a string)".to_string()
        } else {
            CStr::from_ptr(raw).to_string_lossy().into_owned()
        }
    };
    error!("unprotected error in interpreter: {}", message);
    std::process::abort()
}

impl InterpreterHost {
    pub fn new(config: HostConfig, io: HostIo) -> HostResult<Self> {
        let heap = Box::new(BoundedHeap::new(config.heap())?);
        let ud = &*heap as *const BoundedHeap as *mut c_void;

        // SAFETY: the heap is boxed and outlives the state, which is closed
        // in `drop` before the heap goes.
        let state = unsafe { ffi::lua_newstate(lua_alloc, ud) };
        if state.is_null() {
            return Err(HostError::Init(
                "interpreter state does not fit in the heap".to_string(),
            ));
        }
        let lua = unsafe {
            ffi::luaL_requiref(state, c"_G".as_ptr(), ffi::luaopen_base, 1);
            ffi::lua_pop(state, 1);
            let lua = Lua::init_from_ptr(state);
            ffi::lua_atpanic(state, on_lua_panic);
            lua
        };

        lua.load_std_libs(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
        )?;

        let globals = lua.globals();
        let xpcall: Function = globals.raw_get("xpcall")?;
        let tostring: Function = globals.raw_get("tostring")?;
        for name in STRIPPED_GLOBALS {
            globals.raw_set(*name, Value::Nil)?;
        }

        let traceback: TracebackSlot = Rc::new(RefCell::new(None));
        let message_handler =
            protected::message_handler(&lua, tostring, Rc::clone(&traceback))?;
        let debugger = Debugger::new(config.debug, config.break_on_entry, io.console);

        // Setup allocations are not script failures.
        heap.take_failure();

        info!(
            debug = config.debug,
            max_heap = config.max_heap_bytes,
            instruction_limit = config.instruction_limit,
            "interpreter ready"
        );

        Ok(Self {
            runtime: ManuallyDrop::new(Runtime {
                xpcall,
                message_handler,
                lua,
            }),
            state,
            traceback,
            debugger,
            files: io.files,
            instruction_limit: config.instruction_limit,
            heap,
        })
    }

    /// Register a global table of native functions sharing `context`.
    /// Scripts call them with method syntax: `name:fn(...)`.
    pub fn load_library<C: 'static>(
        &self,
        name: &str,
        functions: &[(&'static str, BoundFn<C>)],
        context: Option<Rc<C>>,
    ) -> HostResult<()> {
        library::register(&self.runtime.lua, name, functions, context)?;
        debug!(library = name, functions = functions.len(), "library loaded");
        Ok(())
    }

    /// Load and run a script file. The chunk is named after the path unless a
    /// name is given.
    pub fn load_file(
        &self,
        path: &Path,
        chunk_name: Option<&str>,
        mode: CallMode,
    ) -> HostResult<()> {
        let bytes = self.files.load(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = match chunk_name {
            Some(name) => name.to_string(),
            None => chunk_name_for(path),
        };
        self.load_source(&name, &bytes, mode)
    }

    pub fn load_source(&self, name: &str, source: &[u8], mode: CallMode) -> HostResult<()> {
        let result = self
            .compile(name, source)
            .and_then(|chunk| {
                self.protected_call(chunk, MultiValue::new(), self.instruction_limit)
            })
            .map(|_| ());

        match (mode, result) {
            (CallMode::Unprotected, Err(err)) => {
                error!(chunk = name, "startup chunk failed: {}", err);
                Err(HostError::Panic(err.to_string()))
            }
            (_, result) => result,
        }
    }

    /// Compile a chunk without running it. Binary chunks are rejected.
    pub fn compile(&self, name: &str, source: &[u8]) -> HostResult<Function> {
        if self.debugger.has_chunk(name) {
            return Err(HostError::DuplicateChunk(name.to_string()));
        }
        self.heap.take_failure();

        let chunk = self
            .runtime
            .lua
            .load(source)
            .set_name(format!("@{}", name))
            .set_mode(ChunkMode::Text)
            .into_function()
            .map_err(|err| match err {
                mlua::Error::SyntaxError { message, .. } => HostError::Compile(message),
                _ if self.heap.take_failure() => HostError::OutOfMemory(err.to_string()),
                other => HostError::Compile(protected::root_cause(&other)),
            })?;

        let active = active_lines(&chunk.dump(false)).unwrap_or_else(|err| {
            warn!(chunk = name, "no line info, breakpoints disabled: {}", err);
            BTreeSet::new()
        });
        self.debugger
            .register_chunk(name, &String::from_utf8_lossy(source), active);
        debug!(chunk = name, bytes = source.len(), "chunk compiled");
        Ok(chunk)
    }

    pub fn has_global_function(&self, name: &str) -> bool {
        matches!(
            self.runtime.lua.globals().raw_get::<Value>(name),
            Ok(Value::Function(_))
        )
    }

    pub fn global<T: FromLua>(&self, name: &str) -> HostResult<T> {
        self.runtime
            .lua
            .globals()
            .get::<T>(name)
            .map_err(|e| HostError::script(protected::root_cause(&e)))
    }

    /// Call a global script function under the protected-call boundary with
    /// its own instruction budget.
    pub fn call_global_function<A, R>(
        &self,
        name: &str,
        instruction_limit: u32,
        args: A,
    ) -> HostResult<R>
    where
        A: IntoLuaMulti,
        R: FromLuaMulti,
    {
        let func = match self.runtime.lua.globals().raw_get::<Value>(name)? {
            Value::Function(func) => func,
            _ => {
                return Err(HostError::script(format!(
                    "global function not found: {}",
                    name
                )))
            }
        };
        let args = args.into_lua_multi(&self.runtime.lua)?;
        let results = self.protected_call(func, args, instruction_limit)?;
        R::from_lua_multi(results, &self.runtime.lua).map_err(|e| {
            HostError::script(format!(
                "bad results from {}: {}",
                name,
                protected::root_cause(&e)
            ))
        })
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn instruction_limit(&self) -> u32 {
        self.instruction_limit
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.runtime.lua
    }

    fn protected_call(
        &self,
        func: Function,
        args: MultiValue,
        instruction_limit: u32,
    ) -> HostResult<MultiValue> {
        self.heap.take_failure();
        self.traceback.borrow_mut().take();

        let outcome = {
            let _hook = self.debugger.arm(&self.runtime.lua, instruction_limit);
            self.runtime.xpcall.call::<MultiValue>(protected::xpcall_args(
                func,
                self.runtime.message_handler.clone(),
                args,
            ))
        };

        let heap_failed = self.heap.take_failure();
        let mut values = match outcome {
            Ok(values) => values,
            Err(mlua::Error::MemoryError(message)) => {
                return Err(HostError::OutOfMemory(message))
            }
            Err(err) => return Err(HostError::script(protected::root_cause(&err))),
        };

        match values.pop_front() {
            Some(Value::Boolean(true)) => Ok(values),
            _ => {
                let message = values
                    .pop_front()
                    .and_then(|v| match v {
                        Value::String(s) => Some(s.to_string_lossy()),
                        _ => None,
                    })
                    .unwrap_or_else(|| "unknown error".to_string());
                let traceback = self.traceback.borrow_mut().take();

                // The latch may be left over from a failure the script caught;
                // only the memory error itself is reported as one.
                let out_of_memory = heap_failed
                    && (traceback.is_none() || message == protected::MEMORY_ERROR_MESSAGE);
                if out_of_memory {
                    return Err(HostError::OutOfMemory(message));
                }
                Err(HostError::Script { message, traceback })
            }
        }
    }
}

/// Chunk name for a script path: the path with `/` separators.
pub fn chunk_name_for(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    let joined = parts.join("/");
    if path.has_root() {
        format!("/{}", joined)
    } else {
        joined
    }
}
