//! Platform key codes and the engine key names they map to.

pub mod keycode {
    pub const DPAD_UP: i32 = 19;
    pub const DPAD_DOWN: i32 = 20;
    pub const DPAD_LEFT: i32 = 21;
    pub const DPAD_RIGHT: i32 = 22;
    pub const DPAD_CENTER: i32 = 23;
    pub const VOLUME_UP: i32 = 24;
    pub const VOLUME_DOWN: i32 = 25;
    pub const A: i32 = 29;
    pub const ALT_LEFT: i32 = 57;
    pub const ALT_RIGHT: i32 = 58;
    pub const SHIFT_LEFT: i32 = 59;
    pub const SHIFT_RIGHT: i32 = 60;
    pub const TAB: i32 = 61;
    pub const SPACE: i32 = 62;
    pub const SYM: i32 = 63;
    pub const ENTER: i32 = 66;
    pub const DEL: i32 = 67;
    pub const NUM: i32 = 78;
    pub const MEDIA_PLAY_PAUSE: i32 = 85;
    pub const MEDIA_STOP: i32 = 86;
    pub const MEDIA_NEXT: i32 = 87;
    pub const MEDIA_PREVIOUS: i32 = 88;
    pub const MEDIA_REWIND: i32 = 89;
    pub const MEDIA_FAST_FORWARD: i32 = 90;
    pub const PAGE_UP: i32 = 92;
    pub const PAGE_DOWN: i32 = 93;
    pub const ESCAPE: i32 = 111;
    pub const FORWARD_DEL: i32 = 112;
    pub const CTRL_LEFT: i32 = 113;
    pub const CTRL_RIGHT: i32 = 114;
    pub const META_LEFT: i32 = 117;
    pub const META_RIGHT: i32 = 118;
    pub const FUNCTION: i32 = 119;
    pub const MOVE_HOME: i32 = 122;
    pub const MOVE_END: i32 = 123;
    pub const INSERT: i32 = 124;
    pub const MEDIA_PLAY: i32 = 126;
    pub const MEDIA_PAUSE: i32 = 127;
    pub const MEDIA_RECORD: i32 = 130;
    pub const F1: i32 = 131;
    pub const F12: i32 = 142;
    pub const NUMPAD_0: i32 = 144;
    pub const NUMPAD_9: i32 = 153;
    pub const NUMPAD_DIVIDE: i32 = 154;
    pub const NUMPAD_MULTIPLY: i32 = 155;
    pub const NUMPAD_SUBTRACT: i32 = 156;
    pub const NUMPAD_ADD: i32 = 157;
    pub const NUMPAD_DOT: i32 = 158;
    pub const NUMPAD_ENTER: i32 = 160;
    pub const VOLUME_MUTE: i32 = 164;
    pub const CHANNEL_UP: i32 = 166;
    pub const CHANNEL_DOWN: i32 = 167;
}

use keycode::*;

const FUNCTION_KEYS: [&str; 12] = [
    "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
];
const KEYPAD_DIGITS: [&str; 10] = [
    "KP0", "KP1", "KP2", "KP3", "KP4", "KP5", "KP6", "KP7", "KP8", "KP9",
];

/// Engine name for keys that do not produce a usable character.
pub fn lookup(code: i32) -> Option<&'static str> {
    let name = match code {
        DPAD_UP => "UP",
        DPAD_DOWN => "DOWN",
        DPAD_LEFT => "LEFT",
        DPAD_RIGHT => "RIGHT",
        DPAD_CENTER | ENTER => "ENTER",
        NUMPAD_ENTER => "KP_ENTER",
        DEL => "BS",
        FORWARD_DEL => "DEL",
        ESCAPE => "ESC",
        TAB => "TAB",
        SPACE => "SPACE",
        PAGE_UP => "PGUP",
        PAGE_DOWN => "PGDWN",
        MOVE_HOME => "HOME",
        MOVE_END => "END",
        INSERT => "INS",
        MEDIA_PLAY_PAUSE => "PLAYPAUSE",
        MEDIA_PLAY => "PLAY",
        MEDIA_PAUSE => "PAUSE",
        MEDIA_STOP => "STOP",
        MEDIA_NEXT => "NEXT",
        MEDIA_PREVIOUS => "PREV",
        MEDIA_REWIND => "REWIND",
        MEDIA_FAST_FORWARD => "FORWARD",
        MEDIA_RECORD => "RECORD",
        VOLUME_UP => "VOLUME_UP",
        VOLUME_DOWN => "VOLUME_DOWN",
        VOLUME_MUTE => "MUTE",
        CHANNEL_UP => "CHANNEL_UP",
        CHANNEL_DOWN => "CHANNEL_DOWN",
        NUMPAD_DIVIDE => "KP_DIVIDE",
        NUMPAD_MULTIPLY => "KP_MULTIPLY",
        NUMPAD_SUBTRACT => "KP_SUBTRACT",
        NUMPAD_ADD => "KP_ADD",
        NUMPAD_DOT => "KP_DEC",
        F1..=F12 => FUNCTION_KEYS[(code - F1) as usize],
        NUMPAD_0..=NUMPAD_9 => KEYPAD_DIGITS[(code - NUMPAD_0) as usize],
        _ => return None,
    };
    Some(name)
}

pub fn is_modifier_key(code: i32) -> bool {
    matches!(
        code,
        SHIFT_LEFT
            | SHIFT_RIGHT
            | ALT_LEFT
            | ALT_RIGHT
            | CTRL_LEFT
            | CTRL_RIGHT
            | META_LEFT
            | META_RIGHT
            | SYM
            | FUNCTION
            | NUM
    )
}
