//! Player state that has no single engine property behind it.
//!
//! Repeat mode lives in two loop properties, shuffle in a command plus a flag
//! used as storage. Neither can be written atomically, so these functions are
//! the only code that mutates them: a reader racing a write may briefly see a
//! half-applied combination, which decodes to [`RepeatMode::None`].

use crate::channel::CommandChannel;
use std::fmt;
use tracing::*;

pub const SPEED_LADDER: [f64; 7] = [0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

const LOOP_INFINITE: &str = "inf";
const LOOP_OFF: &str = "no";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    None,
    RepeatPlaylist,
    RepeatFile,
}

impl RepeatMode {
    /// Decodes the `loop-playlist` / `loop-file` pair. Anything other than
    /// exactly one side set to `inf` is `None`.
    pub fn from_flags(loop_playlist: Option<&str>, loop_file: Option<&str>) -> Self {
        match (loop_playlist, loop_file) {
            (Some(LOOP_OFF), Some(LOOP_INFINITE)) => RepeatMode::RepeatFile,
            (Some(LOOP_INFINITE), Some(LOOP_OFF)) => RepeatMode::RepeatPlaylist,
            _ => RepeatMode::None,
        }
    }

    /// `(loop-playlist, loop-file)` values encoding this mode.
    pub fn flags(self) -> (&'static str, &'static str) {
        match self {
            RepeatMode::None => (LOOP_OFF, LOOP_OFF),
            RepeatMode::RepeatPlaylist => (LOOP_INFINITE, LOOP_OFF),
            RepeatMode::RepeatFile => (LOOP_OFF, LOOP_INFINITE),
        }
    }

    pub fn next(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::RepeatPlaylist,
            RepeatMode::RepeatPlaylist => RepeatMode::RepeatFile,
            RepeatMode::RepeatFile => RepeatMode::None,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepeatMode::None => "off",
            RepeatMode::RepeatPlaylist => "playlist",
            RepeatMode::RepeatFile => "file",
        };
        f.write_str(name)
    }
}

pub fn repeat_mode(channel: &CommandChannel) -> RepeatMode {
    let loop_playlist = channel.get_property_string("loop-playlist");
    let loop_file = channel.get_property_string("loop-file");
    RepeatMode::from_flags(loop_playlist.as_deref(), loop_file.as_deref())
}

/// Advances None → RepeatPlaylist → RepeatFile → None and returns the new mode.
pub fn cycle_repeat(channel: &CommandChannel) -> RepeatMode {
    let next = repeat_mode(channel).next();
    let (loop_playlist, loop_file) = next.flags();
    channel.set_property_string("loop-playlist", loop_playlist);
    channel.set_property_string("loop-file", loop_file);
    debug!("[Codec] Repeat mode now {}", next);
    next
}

/// The `shuffle` flag is storage only: toggling it at runtime does nothing,
/// so it is kept in step with the shuffle commands by hand.
pub fn shuffle(channel: &CommandChannel) -> bool {
    channel.get_property_flag("shuffle").unwrap_or(false)
}

/// Target shuffle state for a request, or `None` if nothing changes.
pub fn shuffle_transition(current: bool, cycle: bool, value: bool) -> Option<bool> {
    let desired = if cycle { current ^ value } else { value };
    (desired != current).then_some(desired)
}

/// Sets shuffle to `value`, or toggles it by `value` when `cycle` is set.
/// Returns the resulting state.
pub fn change_shuffle(channel: &CommandChannel, cycle: bool, value: bool) -> bool {
    let current = shuffle(channel);
    let Some(desired) = shuffle_transition(current, cycle, value) else {
        return current;
    };
    channel.command(&[if desired {
        "playlist-shuffle"
    } else {
        "playlist-unshuffle"
    }]);
    channel.set_property_flag("shuffle", desired);
    desired
}

/// First ladder entry strictly above `current`, wrapping to the bottom.
pub fn next_speed(current: f64) -> f64 {
    SPEED_LADDER
        .iter()
        .copied()
        .find(|speed| *speed > current)
        .unwrap_or(SPEED_LADDER[0])
}

pub fn cycle_speed(channel: &CommandChannel) -> f64 {
    let current = channel.get_property_double("speed").unwrap_or(1.0);
    let next = next_speed(current);
    channel.set_property_double("speed", next);
    next
}
