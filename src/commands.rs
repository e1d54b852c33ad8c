use crate::core::*;
use crate::engine::{EventId, PropertyValue, Result};
use crate::error::EngineError;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::*;

fn required<'a>(params: &'a [String], index: usize, command: &str, what: &str) -> Result<&'a str> {
    params
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| EngineError::invalid(command, format!("missing {what}")))
}

fn parse_number(value: &str, command: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| EngineError::invalid(command, format!("'{value}' is not a number")))
}

fn loadfile_command() -> Command {
    Command {
        execute: Arc::new(|params, state| {
            let url = required(params, 0, "loadfile", "url")?;
            let entry = PlaylistEntry {
                filename: url.to_string(),
                title: None,
            };
            match params.get(1).map(String::as_str).unwrap_or("replace") {
                "replace" => {
                    if state.get_int("playlist-pos").unwrap_or(-1) >= 0 {
                        state.emit(EventId::EndFile);
                    }
                    state.take_unshuffled();
                    state.write_playlist(&[entry]);
                    state.start_entry(0)
                }
                "append" => {
                    let mut entries = state.playlist();
                    entries.push(entry.clone());
                    if let Some(mut original) = state.take_unshuffled() {
                        original.push(entry);
                        state.remember_unshuffled(original);
                    }
                    state.write_playlist(&entries);
                    if entries.len() == 1 {
                        state.start_entry(0)
                    } else {
                        Ok(())
                    }
                }
                other => Err(EngineError::invalid(
                    "loadfile",
                    format!("unknown mode '{other}'"),
                )),
            }
        }),
    }
}

fn step_playlist(state: &mut CoreState, forward: bool) -> Result<()> {
    let command = if forward { "playlist-next" } else { "playlist-prev" };
    let count = state.get_int("playlist-count").unwrap_or(0);
    let pos = state.get_int("playlist-pos").unwrap_or(-1);
    let looping = state
        .get_str("loop-playlist")
        .is_some_and(|value| value != "no");

    let target = if forward { pos + 1 } else { pos - 1 };
    let target = if (0..count).contains(&target) {
        target
    } else if looping && count > 0 {
        target.rem_euclid(count)
    } else {
        return Err(EngineError::invalid(command, "no entry in that direction"));
    };

    state.emit(EventId::EndFile);
    state.start_entry(target as usize)
}

fn playlist_next_command() -> Command {
    Command {
        execute: Arc::new(|_params, state| step_playlist(state, true)),
    }
}

fn playlist_prev_command() -> Command {
    Command {
        execute: Arc::new(|_params, state| step_playlist(state, false)),
    }
}

/// Rewrites the playlist while keeping the current entry current.
fn reorder_playlist(state: &mut CoreState, entries: Vec<PlaylistEntry>) {
    let current = state
        .get_int("playlist-pos")
        .and_then(|pos| state.playlist().get(pos as usize).cloned());
    state.write_playlist(&entries);
    if let Some(current) = current {
        if let Some(pos) = entries.iter().position(|entry| *entry == current) {
            state.insert("playlist-pos", PropertyValue::Int64(pos as i64));
        }
    }
}

fn playlist_shuffle_command() -> Command {
    Command {
        execute: Arc::new(|_params, state| {
            let mut entries = state.playlist();
            state.remember_unshuffled(entries.clone());
            entries.shuffle(&mut rand::rng());
            reorder_playlist(state, entries);
            Ok(())
        }),
    }
}

fn playlist_unshuffle_command() -> Command {
    Command {
        execute: Arc::new(|_params, state| {
            if let Some(original) = state.take_unshuffled() {
                reorder_playlist(state, original);
            }
            Ok(())
        }),
    }
}

fn seek_command() -> Command {
    Command {
        execute: Arc::new(|params, state| {
            let target = parse_number(required(params, 0, "seek", "target")?, "seek")?;
            let flags = params.get(1).map(String::as_str).unwrap_or("relative");
            let current = state
                .get_double("time-pos")
                .ok_or_else(|| EngineError::PropertyUnavailable("time-pos".to_string()))?;

            let absolute = flags.split('+').any(|flag| flag == "absolute");
            let mut pos = if absolute { target } else { current + target };
            if let Some(duration) = state.get_double("duration") {
                pos = pos.min(duration);
            }
            state.set("time-pos", PropertyValue::Double(pos.max(0.0)))?;
            state.emit(EventId::Seek);
            state.emit(EventId::PlaybackRestart);
            Ok(())
        }),
    }
}

fn set_command() -> Command {
    Command {
        execute: Arc::new(|params, state| {
            let name = required(params, 0, "set", "property")?;
            let value = required(params, 1, "set", "value")?;
            state.set_from_str(name, value)
        }),
    }
}

fn add_command() -> Command {
    Command {
        execute: Arc::new(|params, state| {
            let name = required(params, 0, "add", "property")?;
            let delta = match params.get(1) {
                Some(value) => parse_number(value, "add")?,
                None => 1.0,
            };
            let current = state
                .get_double(name)
                .ok_or_else(|| EngineError::PropertyUnavailable(name.to_string()))?;
            state.set(name, PropertyValue::Double(current + delta))
        }),
    }
}

/// Steps through "no" followed by every track id of the given type.
fn cycle_track(state: &mut CoreState, property: &str, kind: &str, down: bool) -> Result<()> {
    let mut choices = vec!["no".to_string()];
    choices.extend(state.track_ids(kind).iter().map(i64::to_string));

    let current = state.get_str(property).unwrap_or_else(|| "no".to_string());
    let index = choices.iter().position(|c| *c == current).unwrap_or(0);
    let next = if down {
        (index + choices.len() - 1) % choices.len()
    } else {
        (index + 1) % choices.len()
    };
    state.set_from_str(property, &choices[next])
}

fn cycle_command() -> Command {
    Command {
        execute: Arc::new(|params, state| {
            let name = required(params, 0, "cycle", "property")?;
            let down = params.get(1).is_some_and(|dir| dir == "down");
            match name {
                "audio" => cycle_track(state, "aid", "audio", down),
                "sub" => cycle_track(state, "sid", "sub", down),
                "video" => cycle_track(state, "vid", "video", down),
                _ => {
                    let value = state
                        .get_flag(name)
                        .ok_or_else(|| EngineError::invalid("cycle", format!("'{name}' is not a flag")))?;
                    state.set(name, PropertyValue::Flag(!value))
                }
            }
        }),
    }
}

fn cycle_values_command() -> Command {
    Command {
        execute: Arc::new(|params, state| {
            let name = required(params, 0, "cycle-values", "property")?;
            let values = &params[1..];
            if values.len() < 2 {
                return Err(EngineError::invalid("cycle-values", "need at least two values"));
            }
            let current = state.get_str(name);
            let next = values
                .iter()
                .position(|value| Some(value) == current.as_ref())
                .map(|i| (i + 1) % values.len())
                .unwrap_or(0);
            state.set_from_str(name, &values[next])
        }),
    }
}

fn key_command(name: &'static str) -> Command {
    Command {
        execute: Arc::new(move |params, _state| {
            required(params, 0, name, "key name")?;
            if name == "keypress" {
                if let Some(scale) = params.get(1) {
                    parse_number(scale, name)?;
                }
            }
            debug!("[Engine] {} {}", name, params.join(" "));
            Ok(())
        }),
    }
}

pub fn register_commands(core: &Core) {
    core.add_command("loadfile", loadfile_command());
    core.add_command("playlist-next", playlist_next_command());
    core.add_command("playlist-prev", playlist_prev_command());
    core.add_command("playlist-shuffle", playlist_shuffle_command());
    core.add_command("playlist-unshuffle", playlist_unshuffle_command());
    core.add_command("seek", seek_command());
    core.add_command("set", set_command());
    core.add_command("add", add_command());
    core.add_command("cycle", cycle_command());
    core.add_command("cycle-values", cycle_values_command());
    core.add_command("keydown", key_command("keydown"));
    core.add_command("keyup", key_command("keyup"));
    core.add_command("keypress", key_command("keypress"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn engine() -> Core {
        let core = Core::with_defaults();
        core.init().unwrap();
        core
    }

    fn track(id: i64, kind: &str) -> TrackEntry {
        TrackEntry {
            id,
            kind: kind.to_string(),
            lang: None,
            title: None,
        }
    }

    #[test]
    fn test_loadfile_replace_and_append() {
        let core = engine();
        core.command(&["loadfile", "/media/a.mkv"]).unwrap();
        core.command(&["loadfile", "/media/b.mkv", "append"]).unwrap();

        assert_eq!(core.get_property_int("playlist-count"), Ok(2));
        assert_eq!(core.get_property_int("playlist-pos"), Ok(0));
        assert_eq!(core.get_property_string("media-title"), Ok("a.mkv".to_string()));
        assert_eq!(
            core.get_property_string("playlist/1/filename"),
            Ok("/media/b.mkv".to_string())
        );

        core.command(&["loadfile", "/media/c.mkv"]).unwrap();
        assert_eq!(core.get_property_int("playlist-count"), Ok(1));
        assert!(core.get_property_string("playlist/1/filename").is_err());
    }

    #[test]
    fn test_playlist_navigation_respects_loop() {
        let core = engine();
        core.command(&["loadfile", "a"]).unwrap();
        core.command(&["loadfile", "b", "append"]).unwrap();

        core.command(&["playlist-next"]).unwrap();
        assert_eq!(core.get_property_int("playlist-pos"), Ok(1));
        assert!(core.command(&["playlist-next"]).is_err());

        core.set_property("loop-playlist", PropertyValue::String("inf".to_string()))
            .unwrap();
        core.command(&["playlist-next"]).unwrap();
        assert_eq!(core.get_property_int("playlist-pos"), Ok(0));
    }

    #[test]
    fn test_shuffle_then_unshuffle_restores_order() {
        let core = engine();
        let names = ["a", "b", "c", "d", "e", "f"];
        for (i, name) in names.iter().enumerate() {
            let mode = if i == 0 { "replace" } else { "append" };
            core.command(&["loadfile", name, mode]).unwrap();
        }

        core.command(&["playlist-shuffle"]).unwrap();
        assert_eq!(core.get_property_int("playlist-count"), Ok(6));
        let pos = core.get_property_int("playlist-pos").unwrap();
        assert_eq!(
            core.get_property_string(&format!("playlist/{pos}/filename")),
            Ok("a".to_string())
        );

        core.command(&["playlist-unshuffle"]).unwrap();
        for (i, name) in names.iter().enumerate() {
            assert_eq!(
                core.get_property_string(&format!("playlist/{i}/filename")),
                Ok(name.to_string())
            );
        }
        assert_eq!(core.get_property_int("playlist-pos"), Ok(0));
    }

    #[test]
    fn test_seek() {
        let core = engine();
        assert!(core.command(&["seek", "10", "absolute"]).is_err());

        core.command(&["loadfile", "a"]).unwrap();
        core.add_property("duration", PropertyValue::Double(60.0));
        core.command(&["seek", "10.5", "exact+absolute"]).unwrap();
        assert_eq!(core.get_property_double("time-pos"), Ok(10.5));

        core.command(&["seek", "-20"]).unwrap();
        assert_eq!(core.get_property_double("time-pos"), Ok(0.0));

        core.command(&["seek", "600", "absolute"]).unwrap();
        assert_eq!(core.get_property_double("time-pos"), Ok(60.0));
    }

    #[test]
    fn test_cycle_flag_and_tracks() {
        let core = engine();
        core.command(&["cycle", "pause"]).unwrap();
        assert_eq!(core.get_property_flag("pause"), Ok(true));

        core.set_track_list(&[track(1, "audio"), track(1, "video"), track(2, "audio")]);
        core.command(&["cycle", "audio"]).unwrap();
        assert_eq!(core.get_property_int("aid"), Ok(1));
        core.command(&["cycle", "audio"]).unwrap();
        assert_eq!(core.get_property_int("aid"), Ok(2));
        core.command(&["cycle", "audio"]).unwrap();
        assert_eq!(core.get_property_string("aid"), Ok("no".to_string()));
        core.command(&["cycle", "audio", "down"]).unwrap();
        assert_eq!(core.get_property_int("aid"), Ok(2));
    }

    #[test]
    fn test_cycle_values() {
        let core = engine();
        core.command(&["cycle-values", "hwdec", "auto", "no"]).unwrap();
        assert_eq!(core.get_property_string("hwdec"), Ok("auto".to_string()));
        core.command(&["cycle-values", "hwdec", "auto", "no"]).unwrap();
        assert_eq!(core.get_property_string("hwdec"), Ok("no".to_string()));
        assert!(core.command(&["cycle-values", "hwdec", "auto"]).is_err());
    }

    #[test]
    fn test_set_and_add() {
        let core = engine();
        core.command(&["set", "speed", "1.25"]).unwrap();
        core.command(&["add", "speed", "0.25"]).unwrap();
        assert_eq!(core.get_property_double("speed"), Ok(1.5));
        assert!(core.command(&["set", "speed", "fast"]).is_err());
    }

    #[test]
    fn test_key_commands_validate_arguments() {
        let core = engine();
        assert!(core.command(&["keydown", "ctrl+a"]).is_ok());
        assert!(core.command(&["keypress", "WHEEL_UP", "3"]).is_ok());
        assert!(core.command(&["keypress", "WHEEL_UP", "lots"]).is_err());
        assert!(core.command(&["keyup"]).is_err());
    }
}
