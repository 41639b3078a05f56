use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, Value};

use crate::debugger;

/// Error object Lua raises when an allocation is refused.
pub(crate) const MEMORY_ERROR_MESSAGE: &str = "not enough memory";

/// Traceback captured by the message handler of the last failed call.
pub(crate) type TracebackSlot = Rc<RefCell<Option<String>>>;

/// Build the host message handler passed to `xpcall`. It turns the error
/// object into a message and records a traceback of the faulting stack.
pub(crate) fn message_handler(
    lua: &Lua,
    tostring: Function,
    slot: TracebackSlot,
) -> mlua::Result<Function> {
    lua.create_function(move |lua, err: Value| {
        // Level 0 is this handler; the fault is one frame out.
        let frames = debugger::capture(lua, 1);
        *slot.borrow_mut() = Some(debugger::render(&frames));
        Ok(describe_error(&tostring, err))
    })
}

pub(crate) fn describe_error(tostring: &Function, err: Value) -> String {
    match err {
        Value::String(s) => s.to_string_lossy(),
        Value::Integer(i) => i.to_string(),
        Value::Number(_) => tostring
            .call::<String>(err)
            .unwrap_or_else(|_| "(error object is a number value)".to_string()),
        Value::Error(e) => root_cause(&e),
        Value::Table(ref table) if has_tostring(table) => {
            let type_name = err.type_name();
            tostring
                .call::<String>(err)
                .unwrap_or_else(|_| format!("(error object is a {} value)", type_name))
        }
        other => format!("(error object is a {} value)", other.type_name()),
    }
}

fn has_tostring(table: &mlua::Table) -> bool {
    table
        .metatable()
        .and_then(|meta| meta.raw_get::<Value>("__tostring").ok())
        .is_some_and(|f| !f.is_nil())
}

/// Innermost message of a host-raised error, without mlua's wrapping.
pub(crate) fn root_cause(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_cause(cause),
        mlua::Error::WithContext { cause, .. } => root_cause(cause),
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::MemoryError(message) => message.clone(),
        mlua::Error::ExternalError(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

/// Arguments for `xpcall(f, handler, ...)`.
pub(crate) fn xpcall_args(func: Function, handler: Function, mut args: MultiValue) -> MultiValue {
    args.push_front(Value::Function(handler));
    args.push_front(Value::Function(func));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_root_cause_unwraps_callback_errors() {
        let inner = mlua::Error::RuntimeError("Instruction count exceeded".to_string());
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback:".to_string(),
            cause: Arc::new(inner),
        };
        assert_eq!(root_cause(&wrapped), "Instruction count exceeded");
    }

    #[test]
    fn test_describe_error_values() {
        let lua = Lua::new();
        let tostring: Function = lua.globals().get("tostring").unwrap();

        let msg = lua.create_string("boom").unwrap();
        assert_eq!(describe_error(&tostring, Value::String(msg)), "boom");
        assert_eq!(describe_error(&tostring, Value::Integer(7)), "7");
        assert_eq!(describe_error(&tostring, Value::Number(1.5)), "1.5");
        assert_eq!(
            describe_error(&tostring, Value::Boolean(true)),
            "(error object is a boolean value)"
        );

        let plain = lua.create_table().unwrap();
        assert_eq!(
            describe_error(&tostring, Value::Table(plain)),
            "(error object is a table value)"
        );

        let custom: mlua::Table = lua
            .load("return setmetatable({}, { __tostring = function() return 'custom' end })")
            .eval()
            .unwrap();
        assert_eq!(describe_error(&tostring, Value::Table(custom)), "custom");
    }
}
