use crate::lua::run_script;
use crate::projection::{TrackKind, TrackSlot};
use crate::view::PlayerView;
use mlua::Lua;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl {
    view: Arc<PlayerView>,
    lua: Lua,
}

impl Repl {
    pub fn new(view: Arc<PlayerView>, lua: Lua) -> Self {
        Self { view, lua }
    }

    pub fn run(&mut self) -> io::Result<()> {
        println!("mpvview REPL");
        println!("Type 'help' for available commands, 'quit' to exit\n");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut input = String::new();
        loop {
            print!("> ");
            stdout.flush()?;

            input.clear();
            if stdin.lock().read_line(&mut input)? == 0 {
                break;
            }
            if self.execute(input.trim(), &mut stdout)? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn execute(&mut self, input: &str, out: &mut impl Write) -> io::Result<Flow> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            return Ok(Flow::Continue);
        };
        let view = &self.view;

        match command {
            "quit" | "exit" | "q" => {
                writeln!(out, "Goodbye!")?;
                return Ok(Flow::Quit);
            }
            "help" | "h" => print_help(out)?,
            "status" => self.print_status(out)?,
            "tracks" => {
                let tracks = view.load_tracks();
                for kind in TrackKind::ALL {
                    writeln!(out, "{}:", kind.as_str())?;
                    for track in tracks.get(kind) {
                        writeln!(out, "  {}", track.name)?;
                    }
                }
            }
            "playlist" | "pl" => {
                let playlist = view.load_playlist();
                if playlist.is_empty() {
                    writeln!(out, "Playlist is empty")?;
                }
                let current = view.state().playlist_pos;
                for item in playlist {
                    let marker = if current == Some(item.index as i64) { ">" } else { " " };
                    let name = item.title.as_deref().unwrap_or(&item.filename);
                    writeln!(out, "{} {}. {}", marker, item.index + 1, name)?;
                }
            }
            "chapters" => {
                for chapter in view.load_chapters() {
                    writeln!(
                        out,
                        "  {}. {} [{:.1}s]",
                        chapter.index + 1,
                        chapter.title.as_deref().unwrap_or("-"),
                        chapter.time
                    )?;
                }
            }
            "load" | "add" => {
                if args.is_empty() {
                    writeln!(out, "Usage: {} <path>", command)?;
                } else {
                    let path = args.join(" ");
                    let mode = if command == "add" { "append" } else { "replace" };
                    view.channel().command(&["loadfile", &path, mode]);
                }
            }
            "next" | "n" => view.channel().command(&["playlist-next"]),
            "prev" | "p" => view.channel().command(&["playlist-prev"]),
            "pause" => view.cycle_pause(),
            "seek" => match args.first().and_then(|t| t.parse::<f64>().ok()) {
                Some(target) => view.seek_to(target),
                None => writeln!(out, "Usage: seek <seconds>")?,
            },
            "speed" => match args.first().and_then(|s| s.parse::<f64>().ok()) {
                Some(speed) => view.set_playback_speed(speed),
                None => writeln!(out, "Speed: {}", view.cycle_speed())?,
            },
            "repeat" => writeln!(out, "Repeat: {}", view.cycle_repeat())?,
            "shuffle" => writeln!(out, "Shuffle: {}", view.set_shuffle(true, true))?,
            "aid" | "sid" | "vid" => {
                let slot = match command {
                    "aid" => TrackSlot::Audio,
                    "sid" => TrackSlot::Sub,
                    _ => TrackSlot::Video,
                };
                match args.first().and_then(|id| id.parse::<i64>().ok()) {
                    Some(id) => view.select_track(slot, id),
                    None => writeln!(out, "{}: {}", command, view.selected_track(slot))?,
                }
            }
            "key" => match args.first().and_then(|code| code.parse::<i32>().ok()) {
                Some(code) => {
                    let ch = args.get(1).and_then(|s| s.chars().next());
                    if !view.tap_key(code, ch) {
                        writeln!(out, "Key {} not handled", code)?;
                    }
                }
                None => writeln!(out, "Usage: key <code> [char]")?,
            },
            "scroll" => {
                let h = args.first().and_then(|v| v.parse().ok()).unwrap_or(0.0);
                let v = args.get(1).and_then(|v| v.parse().ok()).unwrap_or(0.0);
                view.map_pointer_scroll(h, v);
            }
            "lua" => {
                let script = args.join(" ");
                if let Err(e) = run_script(&self.lua, &script) {
                    writeln!(out, "Lua error: {}", e)?;
                }
            }
            _ => {
                writeln!(
                    out,
                    "Unknown command: '{}'. Type 'help' for available commands.",
                    command
                )?;
            }
        }
        Ok(Flow::Continue)
    }

    fn print_status(&self, out: &mut impl Write) -> io::Result<()> {
        let state = self.view.state();
        writeln!(out, "\n=== Player Status ===")?;
        writeln!(out, "Paused: {}", if state.paused { "Yes" } else { "No" })?;
        if let Some(title) = &state.media_title {
            writeln!(out, "Title: {}", title)?;
        }
        if let Some(pos) = self.view.time_pos() {
            match self.view.duration() {
                Some(duration) => writeln!(out, "Position: {:.1}s / {:.1}s", pos, duration)?,
                None => writeln!(out, "Position: {:.1}s", pos)?,
            }
        }
        writeln!(out, "Speed: {}", state.speed)?;
        writeln!(out, "Repeat: {}", self.view.repeat_mode())?;
        writeln!(out, "Shuffle: {}", self.view.shuffle())?;
        writeln!(out, "Hwdec: {}", self.view.hwdec_active())?;
        if let Some(aspect) = state.aspect {
            writeln!(out, "Aspect: {:.4}", aspect)?;
        }
        writeln!(out)
    }
}

fn print_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "\nAvailable commands:")?;
    writeln!(out, "  load <path>       - Replace the playlist with a file")?;
    writeln!(out, "  add <path>        - Append a file to the playlist")?;
    writeln!(out, "  next (n)          - Play next entry")?;
    writeln!(out, "  prev (p)          - Play previous entry")?;
    writeln!(out, "  pause             - Toggle pause")?;
    writeln!(out, "  seek <seconds>    - Seek to an absolute position")?;
    writeln!(out, "  speed [value]     - Set speed or step through presets")?;
    writeln!(out, "  repeat            - Cycle off / playlist / file")?;
    writeln!(out, "  shuffle           - Toggle shuffle")?;
    writeln!(out, "  aid|sid|vid [id]  - Show or select a track (-1 = off)")?;
    writeln!(out, "  tracks            - List tracks")?;
    writeln!(out, "  playlist (pl)     - Show the playlist")?;
    writeln!(out, "  chapters          - List chapters")?;
    writeln!(out, "  key <code> [char] - Send a key press")?;
    writeln!(out, "  scroll <h> <v>    - Send wheel movement")?;
    writeln!(out, "  lua <script>      - Run Lua against `player`")?;
    writeln!(out, "  status            - Show player status")?;
    writeln!(out, "  help (h)          - Show this help")?;
    writeln!(out, "  quit (q)          - Exit\n")
}
