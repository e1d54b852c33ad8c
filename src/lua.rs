use crate::view::PlayerView;
use mlua::{Lua, Result, UserData, UserDataMethods, Value};
use std::sync::Arc;

/// Script handle to the player, exposed as the global `player`.
pub struct LuaPlayer(pub Arc<PlayerView>);

impl UserData for LuaPlayer {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("command", |_, player, args: Vec<String>| {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            player.0.channel().command(&args);
            Ok(())
        });

        methods.add_method("get_property", |_, player, name: String| {
            Ok(player.0.channel().get_property_string(&name))
        });

        methods.add_method(
            "set_property",
            |_, player, (name, value): (String, Value)| {
                let channel = player.0.channel();
                match value {
                    Value::String(s) => channel.set_property_string(&name, &s.to_str()?),
                    Value::Boolean(b) => channel.set_property_flag(&name, b),
                    Value::Integer(n) => channel.set_property_int(&name, n),
                    Value::Number(n) => channel.set_property_double(&name, n),
                    other => {
                        return Err(mlua::Error::RuntimeError(format!(
                            "Unsupported value for '{}': {}",
                            name,
                            other.type_name()
                        )));
                    }
                }
                Ok(())
            },
        );

        methods.add_method("cycle_speed", |_, player, ()| Ok(player.0.cycle_speed()));

        methods.add_method("cycle_repeat", |_, player, ()| {
            Ok(player.0.cycle_repeat().to_string())
        });

        methods.add_method("repeat_mode", |_, player, ()| {
            Ok(player.0.repeat_mode().to_string())
        });

        methods.add_method("shuffle", |_, player, ()| Ok(player.0.shuffle()));

        methods.add_method(
            "set_shuffle",
            |_, player, (value, cycle): (bool, Option<bool>)| {
                Ok(player.0.set_shuffle(cycle.unwrap_or(false), value))
            },
        );

        methods.add_method("key", |_, player, (code, ch): (i32, Option<String>)| {
            let ch = ch.and_then(|s| s.chars().next());
            Ok(player.0.tap_key(code, ch))
        });

        methods.add_method("scroll", |_, player, (h, v): (f64, f64)| {
            Ok(player.0.map_pointer_scroll(h, v))
        });
    }
}

pub fn init_lua(view: Arc<PlayerView>) -> Result<Lua> {
    let lua = Lua::new();
    lua.globals().set("player", LuaPlayer(view))?;
    Ok(lua)
}

pub fn run_script(lua: &Lua, script: &str) -> Result<()> {
    lua.load(script).exec()
}
