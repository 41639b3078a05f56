// tests/sandbox_tests.rs
// Interpreter host: limits, error reporting, library binding

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use mlua::{IntoLuaMulti, Lua, MultiValue};
use script_host::platform::{MemoryFiles, ScriptedConsole};
use script_host::{CallMode, HostConfig, HostError, HostIo, InterpreterHost};

#[cfg(test)]
mod sandbox_tests {
    use super::*;

    fn host_with(config: HostConfig, files: MemoryFiles) -> InterpreterHost {
        InterpreterHost::new(
            config,
            HostIo {
                files: Arc::new(files),
                console: Box::new(ScriptedConsole::new(Vec::<String>::new())),
            },
        )
        .expect("host should start")
    }

    fn host_with_source(source: &str) -> InterpreterHost {
        let host = host_with(HostConfig::default(), MemoryFiles::new());
        host.load_source("test.lua", source.as_bytes(), CallMode::Protected)
            .expect("source should load");
        host
    }

    fn script_message(err: HostError) -> String {
        match err {
            HostError::Script { message, .. } => message,
            other => panic!("expected a script error, got {:?}", other),
        }
    }

    #[test]
    fn test_infinite_loop_hits_instruction_limit() {
        let config = HostConfig {
            instruction_limit: 1000,
            ..HostConfig::default()
        };
        let files = MemoryFiles::new().with("spin.lua", "function spin() while true do end end");
        let host = host_with(config, files);
        host.load_file(Path::new("spin.lua"), None, CallMode::Protected)
            .expect("definition should load");

        let err = host
            .call_global_function::<_, ()>("spin", 1000, ())
            .expect_err("loop must be stopped");
        let message = script_message(err);
        assert!(
            message.contains("Instruction count exceeded"),
            "unexpected message: {}",
            message
        );

        // The host stays usable after the limit fires.
        host.load_source("after.lua", b"x = 1", CallMode::Protected)
            .expect("host should still run code");
    }

    #[test]
    fn test_heap_exhaustion_is_out_of_memory() {
        let config = HostConfig {
            max_heap_bytes: 4 * 1024 * 1024,
            initial_heap_bytes: 1024 * 1024,
            ..HostConfig::default()
        };
        let host = host_with(config, MemoryFiles::new());
        host.load_source(
            "grow.lua",
            br#"
function grow()
  local t = {}
  for i = 1, 64 do
    t[i] = string.rep("x", 1024 * 1024) .. i
  end
end
"#,
            CallMode::Protected,
        )
        .expect("definition should load");

        let err = host
            .call_global_function::<_, ()>("grow", 1_000_000, ())
            .expect_err("heap must run out");
        assert!(
            matches!(err, HostError::OutOfMemory(_)),
            "expected out of memory, got {:?}",
            err
        );

        let stats = host.heap_stats();
        assert!(stats.committed <= stats.reserved, "committed past the maximum");
        assert!(stats.peak <= 4 * 1024 * 1024, "peak past the maximum");
    }

    #[test]
    fn test_no_threads_escape_the_instruction_limit() {
        let config = HostConfig {
            instruction_limit: 1000,
            ..HostConfig::default()
        };
        let host = host_with(config, MemoryFiles::new());
        host.load_source(
            "threads.lua",
            b"function spin()\n\
              local co = coroutine.wrap(function() while true do end end)\n\
              co()\n\
              end",
            CallMode::Protected,
        )
        .expect("definition should load");

        let err = host
            .call_global_function::<_, ()>("spin", 1000, ())
            .expect_err("coroutines are not available");
        let message = script_message(err);
        assert!(message.contains("coroutine"), "unexpected message: {}", message);
    }

    #[test]
    fn test_caught_allocation_failure_does_not_taint_later_errors() {
        let config = HostConfig {
            max_heap_bytes: 2 * 1024 * 1024,
            initial_heap_bytes: 512 * 1024,
            ..HostConfig::default()
        };
        let host = host_with(config, MemoryFiles::new());
        host.load_source(
            "recover.lua",
            b"function g()\n\
              local ok = pcall(string.rep, 'x', 8 * 1024 * 1024)\n\
              assert(not ok)\n\
              error('unrelated failure')\n\
              end",
            CallMode::Protected,
        )
        .expect("definition should load");

        let err = host.call_global_function::<_, ()>("g", 100_000, ()).unwrap_err();
        assert!(
            matches!(err, HostError::Script { .. }),
            "expected a script error, got {:?}",
            err
        );
        assert!(err.traceback().is_some(), "script errors carry a traceback");
        assert!(script_message(err).contains("unrelated failure"));

        // The host still reports a real exhaustion as such.
        host.load_source(
            "exhaust.lua",
            b"function h() return string.rep('x', 8 * 1024 * 1024) end",
            CallMode::Protected,
        )
        .unwrap();
        let err = host.call_global_function::<_, ()>("h", 100_000, ()).unwrap_err();
        assert!(matches!(err, HostError::OutOfMemory(_)), "got {:?}", err);
    }

    #[test]
    fn test_table_error_object_message() {
        let host = host_with_source("function bad() error({}) end");
        let err = host.call_global_function::<_, ()>("bad", 10_000, ()).unwrap_err();
        assert_eq!(script_message(err), "(error object is a table value)");
    }

    #[test]
    fn test_tostring_error_object_message() {
        let host = host_with_source(
            "function bad() error(setmetatable({}, { __tostring = function() return 'custom failure' end })) end",
        );
        let err = host.call_global_function::<_, ()>("bad", 10_000, ()).unwrap_err();
        assert_eq!(script_message(err), "custom failure");
    }

    #[test]
    fn test_string_error_carries_traceback() {
        let host = host_with_source("function inner() error('boom') end\nfunction outer() inner() end");
        let err = host.call_global_function::<_, ()>("outer", 10_000, ()).unwrap_err();

        let traceback = err.traceback().map(str::to_string);
        let message = script_message(err);
        assert!(message.contains("boom"), "message was {}", message);

        let traceback = traceback.expect("traceback should be attached");
        assert!(traceback.starts_with("stack traceback:"), "{}", traceback);
        assert!(traceback.contains("test.lua:1"), "{}", traceback);
    }

    #[test]
    fn test_unsafe_globals_are_removed() {
        let host = host_with_source(
            "assert(dofile == nil and loadfile == nil and load == nil)\n\
             assert(loadstring == nil and require == nil and print == nil)\n\
             assert(io == nil and os == nil and debug == nil and package == nil)\n\
             assert(coroutine == nil)\n\
             assert(string and table and math and utf8)",
        );
        assert!(!host.has_global_function("load"));
        assert!(host.has_global_function("pairs"));
    }

    #[test]
    fn test_compile_errors() {
        let host = host_with(HostConfig::default(), MemoryFiles::new());
        let err = host
            .load_source("broken.lua", b"function (", CallMode::Protected)
            .unwrap_err();
        assert!(matches!(err, HostError::Compile(_)), "got {:?}", err);

        let err = host
            .load_source("binary.lua", b"\x1bLua\x54\x00", CallMode::Protected)
            .unwrap_err();
        assert!(matches!(err, HostError::Compile(_)), "binary chunk accepted: {:?}", err);
    }

    #[test]
    fn test_duplicate_chunk_name() {
        let host = host_with_source("a = 1");
        let err = host
            .load_source("test.lua", b"a = 2", CallMode::Protected)
            .unwrap_err();
        assert!(matches!(err, HostError::DuplicateChunk(ref name) if name == "test.lua"));
    }

    #[test]
    fn test_unprotected_failure_is_fatal() {
        let host = host_with(HostConfig::default(), MemoryFiles::new());
        let err = host
            .load_source("boot.lua", b"error('boot failed')", CallMode::Unprotected)
            .unwrap_err();
        assert!(matches!(err, HostError::Panic(_)), "got {:?}", err);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_typed_call_and_missing_global() {
        let host = host_with_source("function add(a, b) return a + b end");
        let sum: i64 = host.call_global_function("add", 10_000, (2, 3)).unwrap();
        assert_eq!(sum, 5);

        let err = host.call_global_function::<_, ()>("nope", 10_000, ()).unwrap_err();
        assert_eq!(script_message(err), "global function not found: nope");
    }

    #[test]
    fn test_reload_discards_globals() {
        let first = host_with_source("counter = 5");
        assert_eq!(first.global::<i64>("counter").unwrap(), 5);
        drop(first);

        let second = host_with(HostConfig::default(), MemoryFiles::new());
        assert_eq!(second.global::<Option<i64>>("counter").unwrap(), None);
    }

    fn get_number(lua: &Lua, value: &u32, _args: MultiValue) -> mlua::Result<MultiValue> {
        (*value).into_lua_multi(lua)
    }

    fn get_text(lua: &Lua, value: &String, _args: MultiValue) -> mlua::Result<MultiValue> {
        value.clone().into_lua_multi(lua)
    }

    #[test]
    fn test_library_context_binding() {
        let host = host_with(HostConfig::default(), MemoryFiles::new());
        host.load_library("numbers", &[("get", get_number)], Some(Rc::new(42u32)))
            .unwrap();
        host.load_library("words", &[("get", get_text)], Some(Rc::new("hi".to_string())))
            .unwrap();
        host.load_library::<u32>("empty", &[("get", get_number)], None)
            .unwrap();
        host.load_source(
            "lib.lua",
            b"function good() return numbers:get(), words:get() end\n\
              function missing() return empty:get() end\n\
              function wrong() return words.get(numbers) end\n\
              function hidden() return getmetatable(numbers) end",
            CallMode::Protected,
        )
        .unwrap();

        let (n, s): (u32, String) = host.call_global_function("good", 10_000, ()).unwrap();
        assert_eq!((n, s.as_str()), (42, "hi"));

        let message = script_message(host.call_global_function::<_, ()>("missing", 10_000, ()).unwrap_err());
        assert!(message.contains("type error"), "{}", message);

        let message = script_message(host.call_global_function::<_, ()>("wrong", 10_000, ()).unwrap_err());
        assert!(message.contains("type error"), "{}", message);

        let hidden: bool = host.call_global_function("hidden", 10_000, ()).unwrap();
        assert!(!hidden, "library metatable should be hidden");
    }
}
