use std::collections::BTreeMap;

use mlua::{IntoLua, Lua, Value};

/// Key name to pressed flag, handed to `update(keys)` as a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    keys: BTreeMap<String, bool>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, down: bool) {
        self.keys.insert(key.into(), down);
    }

    pub fn press(&mut self, key: impl Into<String>) {
        self.set(key, true);
    }

    pub fn release(&mut self, key: impl Into<String>) {
        self.set(key, false);
    }

    pub fn is_down(&self, key: &str) -> bool {
        self.keys.get(key).copied().unwrap_or(false)
    }
}

impl IntoLua for KeyState {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        let table = lua.create_table_with_capacity(0, self.keys.len())?;
        for (key, down) in self.keys {
            table.raw_set(key, down)?;
        }
        Ok(Value::Table(table))
    }
}
