use std::rc::Rc;

use mlua::{Lua, MultiValue, Table, Value};

/// Native library function. Receives the library's context and the call
/// arguments with the `self` table already removed.
pub type BoundFn<C> = fn(&Lua, &C, MultiValue) -> mlua::Result<MultiValue>;

/// Metatable field holding a library's context.
const CONTEXT_FIELD: &str = "__context";

struct LibraryContext<C>(Rc<C>);

pub(crate) fn register<C: 'static>(
    lua: &Lua,
    name: &str,
    functions: &[(&'static str, BoundFn<C>)],
    context: Option<Rc<C>>,
) -> mlua::Result<Table> {
    let library = lua.create_table()?;

    for &(fn_name, f) in functions {
        let wrapped = lua.create_function(move |lua, mut args: MultiValue| {
            let this = args.pop_front();
            let context = context_of::<C>(this)?;
            f(lua, &context, args)
        })?;
        library.raw_set(fn_name, wrapped)?;
    }

    let meta = lua.create_table()?;
    if let Some(context) = context {
        meta.raw_set(CONTEXT_FIELD, lua.create_any_userdata(LibraryContext(context))?)?;
    }
    meta.raw_set("__metatable", false)?;
    library.set_metatable(Some(meta));

    lua.globals().raw_set(name, library.clone())?;
    Ok(library)
}

fn context_of<C: 'static>(this: Option<Value>) -> mlua::Result<Rc<C>> {
    let Some(Value::Table(library)) = this else {
        return Err(type_error(
            "library function called without its table (use ':' to call it)",
        ));
    };
    let field = match library.metatable() {
        Some(meta) => meta.raw_get::<Value>(CONTEXT_FIELD)?,
        None => Value::Nil,
    };
    let Value::UserData(userdata) = field else {
        return Err(type_error("library has no context"));
    };
    let context = userdata
        .borrow::<LibraryContext<C>>()
        .map_err(|_| type_error("library context has the wrong type"))?;
    Ok(Rc::clone(&context.0))
}

fn type_error(message: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!("type error: {}", message))
}
