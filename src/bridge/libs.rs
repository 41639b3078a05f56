use std::path::PathBuf;

use mlua::{FromLuaMulti, Function, IntoLuaMulti, Lua, MultiValue, Table};

use super::ScriptServices;
use crate::host::BoundFn;
use crate::platform::Transform;
use crate::resource::ResourceSpec;

const DEFAULT_TEXT_COLOR: u32 = 0xFFFF_FFFF;

pub(super) static TRACE: &[(&str, BoundFn<ScriptServices>)] = &[("write", trace_write)];

pub(super) static RESOURCE: &[(&str, BoundFn<ScriptServices>)] = &[
    ("addTexture", add_texture),
    ("addFont", add_font),
    ("addSe", add_sound_effect),
    ("addBgm", add_bgm),
];

pub(super) static GRAPH: &[(&str, BoundFn<ScriptServices>)] = &[
    ("getTextureSize", get_texture_size),
    ("drawTexture", draw_texture),
    ("drawString", draw_string),
];

pub(super) static SOUND: &[(&str, BoundFn<ScriptServices>)] = &[
    ("playBgm", play_bgm),
    ("stopBgm", stop_bgm),
    ("playSe", play_sound_effect),
];

fn none(lua: &Lua) -> mlua::Result<MultiValue> {
    ().into_lua_multi(lua)
}

pub(super) fn trace_write(
    lua: &Lua,
    services: &ScriptServices,
    args: MultiValue,
) -> mlua::Result<MultiValue> {
    let tostring: Function = lua.globals().get("tostring")?;
    let parts = args
        .into_iter()
        .map(|value| tostring.call::<String>(value))
        .collect::<mlua::Result<Vec<_>>>()?;
    services.write_trace(&parts.join("\t"));
    none(lua)
}

fn add_texture(lua: &Lua, services: &ScriptServices, args: MultiValue) -> mlua::Result<MultiValue> {
    let (set, id, path) = <(u32, String, String)>::from_lua_multi(args, lua)?;
    let spec = ResourceSpec::Texture {
        path: PathBuf::from(path),
    };
    services
        .add_resource(set, &id, spec)
        .map_err(mlua::Error::external)?;
    none(lua)
}

fn add_font(lua: &Lua, services: &ScriptServices, args: MultiValue) -> mlua::Result<MultiValue> {
    let (set, id, path, size) = <(u32, String, String, u32)>::from_lua_multi(args, lua)?;
    let spec = ResourceSpec::Font {
        path: PathBuf::from(path),
        size,
    };
    services
        .add_resource(set, &id, spec)
        .map_err(mlua::Error::external)?;
    none(lua)
}

fn add_sound_effect(
    lua: &Lua,
    services: &ScriptServices,
    args: MultiValue,
) -> mlua::Result<MultiValue> {
    let (set, id, path) = <(u32, String, String)>::from_lua_multi(args, lua)?;
    let spec = ResourceSpec::SoundEffect {
        path: PathBuf::from(path),
    };
    services
        .add_resource(set, &id, spec)
        .map_err(mlua::Error::external)?;
    none(lua)
}

fn add_bgm(lua: &Lua, services: &ScriptServices, args: MultiValue) -> mlua::Result<MultiValue> {
    let (set, id, path) = <(u32, String, String)>::from_lua_multi(args, lua)?;
    let spec = ResourceSpec::Bgm {
        path: PathBuf::from(path),
    };
    services
        .add_resource(set, &id, spec)
        .map_err(mlua::Error::external)?;
    none(lua)
}

fn get_texture_size(
    lua: &Lua,
    services: &ScriptServices,
    args: MultiValue,
) -> mlua::Result<MultiValue> {
    let (set, id) = <(u32, String)>::from_lua_multi(args, lua)?;
    let (width, height) = services
        .texture_size(set, &id)
        .map_err(mlua::Error::external)?;
    (width, height).into_lua_multi(lua)
}

fn draw_texture(lua: &Lua, services: &ScriptServices, args: MultiValue) -> mlua::Result<MultiValue> {
    let (set, id, x, y, opts) =
        <(u32, String, f32, f32, Option<Table>)>::from_lua_multi(args, lua)?;

    let mut transform = Transform::at(x, y);
    if let Some(opts) = opts {
        if let Some(sx) = opts.get::<Option<f32>>("sx")? {
            transform.sx = sx;
        }
        if let Some(sy) = opts.get::<Option<f32>>("sy")? {
            transform.sy = sy;
        }
        if let Some(angle) = opts.get::<Option<f32>>("angle")? {
            transform.angle = angle;
        }
        if let Some(alpha) = opts.get::<Option<f32>>("alpha")? {
            transform.alpha = alpha.clamp(0.0, 1.0);
        }
    }

    services
        .draw_texture(set, &id, transform)
        .map_err(mlua::Error::external)?;
    none(lua)
}

fn draw_string(lua: &Lua, services: &ScriptServices, args: MultiValue) -> mlua::Result<MultiValue> {
    let (set, font_id, text, x, y, color) =
        <(u32, String, String, f32, f32, Option<u32>)>::from_lua_multi(args, lua)?;
    services
        .draw_string(set, &font_id, &text, x, y, color.unwrap_or(DEFAULT_TEXT_COLOR))
        .map_err(mlua::Error::external)?;
    none(lua)
}

fn play_bgm(lua: &Lua, services: &ScriptServices, args: MultiValue) -> mlua::Result<MultiValue> {
    let (set, id) = <(u32, String)>::from_lua_multi(args, lua)?;
    services.play_bgm(set, &id).map_err(mlua::Error::external)?;
    none(lua)
}

fn stop_bgm(lua: &Lua, services: &ScriptServices, _args: MultiValue) -> mlua::Result<MultiValue> {
    services.stop_bgm();
    none(lua)
}

fn play_sound_effect(
    lua: &Lua,
    services: &ScriptServices,
    args: MultiValue,
) -> mlua::Result<MultiValue> {
    let (set, id) = <(u32, String)>::from_lua_multi(args, lua)?;
    services
        .play_sound_effect(set, &id)
        .map_err(mlua::Error::external)?;
    none(lua)
}
