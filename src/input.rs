//! Key and pointer events turned into engine key commands.

use crate::channel::CommandChannel;
use crate::keymap;
use tracing::*;

/// Set on the unicode value of a dead key (a combining accent).
pub const COMBINING_ACCENT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
    /// Several key events collapsed into one; never forwarded.
    Multiple,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    fn names(self) -> impl Iterator<Item = &'static str> {
        [
            (self.shift, "shift"),
            (self.ctrl, "ctrl"),
            (self.alt, "alt"),
            (self.meta, "meta"),
        ]
        .into_iter()
        .filter_map(|(held, name)| held.then_some(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: i32,
    pub action: KeyAction,
    pub modifiers: Modifiers,
    pub repeat_count: u32,
    pub printable: bool,
    pub unicode_char: u32,
}

impl KeyEvent {
    pub fn new(code: i32, action: KeyAction) -> Self {
        Self {
            code,
            action,
            modifiers: Modifiers::default(),
            repeat_count: 0,
            printable: false,
            unicode_char: 0,
        }
    }

    pub fn printable(code: i32, action: KeyAction, ch: char) -> Self {
        Self {
            printable: true,
            unicode_char: ch as u32,
            ..Self::new(code, action)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeyOutcome {
    Ignored,
    /// No table entry and nothing printable; `report` is false on repeats.
    Unmapped { report: bool },
    DeadKey,
    /// Native key repeat; the engine repeats keys itself.
    Swallowed,
    Send { action: &'static str, token: String },
}

pub(crate) fn classify(event: &KeyEvent) -> KeyOutcome {
    if event.action == KeyAction::Multiple || keymap::is_modifier_key(event.code) {
        return KeyOutcome::Ignored;
    }

    let key = match keymap::lookup(event.code) {
        Some(name) => name.to_string(),
        None if !event.printable => {
            return KeyOutcome::Unmapped {
                report: event.repeat_count == 0,
            };
        }
        None => {
            if event.unicode_char & COMBINING_ACCENT != 0 {
                return KeyOutcome::DeadKey;
            }
            match char::from_u32(event.unicode_char) {
                Some(ch) if ch != '\0' => ch.to_string(),
                _ => return KeyOutcome::Unmapped { report: false },
            }
        }
    };

    if event.repeat_count > 0 {
        return KeyOutcome::Swallowed;
    }

    let mut token: Vec<&str> = event.modifiers.names().collect();
    token.push(&key);
    let action = if event.action == KeyAction::Down {
        "keydown"
    } else {
        "keyup"
    };
    KeyOutcome::Send {
        action,
        token: token.join("+"),
    }
}

pub struct InputMapper {
    channel: CommandChannel,
}

impl InputMapper {
    pub fn new(channel: CommandChannel) -> Self {
        Self { channel }
    }

    /// Returns whether the event was consumed.
    pub fn map_key_event(&self, event: &KeyEvent) -> bool {
        match classify(event) {
            KeyOutcome::Ignored | KeyOutcome::DeadKey => false,
            KeyOutcome::Unmapped { report } => {
                if report {
                    debug!("[Input] Unmapped non-printable key {}", event.code);
                }
                false
            }
            KeyOutcome::Swallowed => true,
            KeyOutcome::Send { action, token } => {
                self.channel.command(&[action, &token]);
                true
            }
        }
    }

    /// Press and release of one key. Returns whether the press was handled.
    pub fn tap_key(&self, code: i32, ch: Option<char>) -> bool {
        let event = |action| match ch {
            Some(ch) => KeyEvent::printable(code, action, ch),
            None => KeyEvent::new(code, action),
        };
        let handled = self.map_key_event(&event(KeyAction::Down));
        self.map_key_event(&event(KeyAction::Up));
        handled
    }

    /// Forwards wheel movement as one keypress per non-zero axis.
    pub fn map_pointer_scroll(&self, horizontal: f64, vertical: f64) -> bool {
        if horizontal > 0.0 {
            self.wheel("WHEEL_RIGHT", horizontal);
        } else if horizontal < 0.0 {
            self.wheel("WHEEL_LEFT", -horizontal);
        }
        if vertical > 0.0 {
            self.wheel("WHEEL_UP", vertical);
        } else if vertical < 0.0 {
            self.wheel("WHEEL_DOWN", -vertical);
        }
        true
    }

    fn wheel(&self, key: &str, amount: f64) {
        self.channel.command(&["keypress", key, &amount.to_string()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Core;
    use crate::engine::Engine;
    use crate::keymap::keycode;
    use std::sync::Arc;

    fn mapper() -> (Arc<Core>, InputMapper) {
        let core = Arc::new(Core::with_defaults());
        core.init().unwrap();
        let mapper = InputMapper::new(CommandChannel::new(core.clone()));
        (core, mapper)
    }

    fn history(core: &Core) -> Vec<String> {
        core.command_history()
            .into_iter()
            .map(|args| args.join(" "))
            .collect()
    }

    fn send(action: &'static str, token: &str) -> KeyOutcome {
        KeyOutcome::Send {
            action,
            token: token.to_string(),
        }
    }

    #[test]
    fn test_mapped_key_with_modifiers() {
        let mut event = KeyEvent::new(keycode::DPAD_LEFT, KeyAction::Down);
        event.modifiers = Modifiers {
            shift: true,
            ctrl: false,
            alt: true,
            meta: true,
        };
        assert_eq!(classify(&event), send("keydown", "shift+alt+meta+LEFT"));

        let event = KeyEvent::new(keycode::SPACE, KeyAction::Up);
        assert_eq!(classify(&event), send("keyup", "SPACE"));
    }

    #[test]
    fn test_printable_and_dead_keys() {
        let mut event = KeyEvent::printable(keycode::A, KeyAction::Down, 'a');
        event.modifiers.ctrl = true;
        assert_eq!(classify(&event), send("keydown", "ctrl+a"));

        let mut dead = KeyEvent::printable(keycode::A, KeyAction::Down, '`');
        dead.unicode_char |= COMBINING_ACCENT;
        assert_eq!(classify(&dead), KeyOutcome::DeadKey);
    }

    #[test]
    fn test_ignored_events() {
        let event = KeyEvent::new(keycode::SHIFT_LEFT, KeyAction::Down);
        assert_eq!(classify(&event), KeyOutcome::Ignored);

        let event = KeyEvent::printable(keycode::A, KeyAction::Multiple, 'a');
        assert_eq!(classify(&event), KeyOutcome::Ignored);
    }

    #[test]
    fn test_unmapped_reported_once() {
        let mut event = KeyEvent::new(9999, KeyAction::Down);
        assert_eq!(classify(&event), KeyOutcome::Unmapped { report: true });
        event.repeat_count = 1;
        assert_eq!(classify(&event), KeyOutcome::Unmapped { report: false });
    }

    #[test]
    fn test_repeats_are_swallowed() {
        let (core, mapper) = mapper();
        let mut event = KeyEvent::new(keycode::DPAD_RIGHT, KeyAction::Down);
        event.repeat_count = 3;
        assert!(mapper.map_key_event(&event));
        assert!(core.command_history().is_empty());
    }

    #[test]
    fn test_map_key_event_issues_command() {
        let (core, mapper) = mapper();
        assert!(mapper.map_key_event(&KeyEvent::new(keycode::MEDIA_PLAY_PAUSE, KeyAction::Down)));
        assert!(mapper.map_key_event(&KeyEvent::new(keycode::MEDIA_PLAY_PAUSE, KeyAction::Up)));
        assert!(!mapper.map_key_event(&KeyEvent::new(9999, KeyAction::Down)));
        assert_eq!(
            history(&core),
            vec!["keydown PLAYPAUSE", "keyup PLAYPAUSE"]
        );
    }

    #[test]
    fn test_scroll() {
        let (core, mapper) = mapper();
        assert!(mapper.map_pointer_scroll(-3.0, 0.0));
        assert_eq!(history(&core), vec!["keypress WHEEL_LEFT 3"]);

        core.clear_command_history();
        assert!(mapper.map_pointer_scroll(1.5, -2.0));
        assert_eq!(
            history(&core),
            vec!["keypress WHEEL_RIGHT 1.5", "keypress WHEEL_DOWN 2"]
        );
    }
}
