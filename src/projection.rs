//! Typed application state projected from engine properties.
//!
//! Lists (tracks, playlist, chapters) are always rebuilt from scratch into a
//! fresh container and swapped in whole. Any per-index read may come back
//! empty because the engine can drop entries between two reads; such indices
//! are skipped.

use crate::channel::CommandChannel;
use crate::codec::{self, RepeatMode};
use crate::engine::{EventId, EventObserver, PropertyChange};
use crate::registry::{ObserverRegistry, PropertyUpdate};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::*;

/// Track id standing for "disabled"; engine ids are never negative.
pub const DISABLED_TRACK_ID: i64 = -1;

/// Below this the aspect ratio is treated as unknown.
pub const ASPECT_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
    Sub,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Audio, TrackKind::Video, TrackKind::Sub];

    pub fn from_engine(kind: &str) -> Option<Self> {
        match kind {
            "audio" => Some(TrackKind::Audio),
            "video" => Some(TrackKind::Video),
            "sub" => Some(TrackKind::Sub),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
            TrackKind::Sub => "sub",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub engine_id: i64,
    pub name: String,
}

impl Track {
    /// Pseudo-track that lets the user switch a track kind off.
    pub fn disabled() -> Self {
        Self {
            engine_id: DISABLED_TRACK_ID,
            name: "Off".to_string(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.engine_id == DISABLED_TRACK_ID
    }
}

/// `#id: title (lang)`, `#id: title`, `#id: lang` or `#id`.
pub fn track_display_name(id: i64, lang: Option<&str>, title: Option<&str>) -> String {
    let lang = lang.filter(|s| !s.is_empty());
    let title = title.filter(|s| !s.is_empty());
    match (title, lang) {
        (Some(title), Some(lang)) => format!("#{id}: {title} ({lang})"),
        (Some(text), None) | (None, Some(text)) => format!("#{id}: {text}"),
        (None, None) => format!("#{id}"),
    }
}

/// Tracks grouped by kind, each group headed by the disabled pseudo-track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackList {
    audio: Vec<Track>,
    video: Vec<Track>,
    sub: Vec<Track>,
}

impl Default for TrackList {
    fn default() -> Self {
        Self {
            audio: vec![Track::disabled()],
            video: vec![Track::disabled()],
            sub: vec![Track::disabled()],
        }
    }
}

impl TrackList {
    pub fn get(&self, kind: TrackKind) -> &[Track] {
        match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Video => &self.video,
            TrackKind::Sub => &self.sub,
        }
    }

    fn group_mut(&mut self, kind: TrackKind) -> &mut Vec<Track> {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
            TrackKind::Sub => &mut self.sub,
        }
    }

    /// Number of real (non-sentinel) tracks.
    pub fn real_count(&self) -> usize {
        TrackKind::ALL
            .iter()
            .map(|kind| self.get(*kind).len() - 1)
            .sum()
    }
}

pub fn load_tracks(channel: &CommandChannel) -> TrackList {
    let mut tracks = TrackList::default();
    let count = channel.get_property_int("track-list/count").unwrap_or(0);

    for i in 0..count {
        let Some(kind_name) = channel.get_property_string(&format!("track-list/{i}/type")) else {
            continue;
        };
        let Some(kind) = TrackKind::from_engine(&kind_name) else {
            warn!("[Tracks] Got unknown track type: {}", kind_name);
            continue;
        };
        let Some(engine_id) = channel.get_property_int(&format!("track-list/{i}/id")) else {
            continue;
        };
        let lang = channel.get_property_string(&format!("track-list/{i}/lang"));
        let title = channel.get_property_string(&format!("track-list/{i}/title"));

        tracks.group_mut(kind).push(Track {
            engine_id,
            name: track_display_name(engine_id, lang.as_deref(), title.as_deref()),
        });
    }
    tracks
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub index: usize,
    pub filename: String,
    pub title: Option<String>,
}

pub fn load_playlist(channel: &CommandChannel) -> Vec<PlaylistItem> {
    let count = channel.get_property_int("playlist-count").unwrap_or(0);
    (0..count.max(0) as usize)
        .filter_map(|index| {
            let filename = channel.get_property_string(&format!("playlist/{index}/filename"))?;
            let title = channel.get_property_string(&format!("playlist/{index}/title"));
            Some(PlaylistItem {
                index,
                filename,
                title,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub index: usize,
    pub title: Option<String>,
    pub time: f64,
}

pub fn load_chapters(channel: &CommandChannel) -> Vec<Chapter> {
    let count = channel.get_property_int("chapter-list/count").unwrap_or(0);
    (0..count.max(0) as usize)
        .filter_map(|index| {
            let time = channel.get_property_double(&format!("chapter-list/{index}/time"))?;
            let title = channel.get_property_string(&format!("chapter-list/{index}/title"));
            Some(Chapter { index, title, time })
        })
        .collect()
}

/// Swaps width and height when the picture is rotated by a quarter turn.
pub fn rotate_aspect(aspect: f64, rotation: i64) -> f64 {
    if rotation.rem_euclid(180) == 90 {
        1.0 / aspect
    } else {
        aspect
    }
}

/// Display aspect ratio with rotation applied; `Some(0.0)` when unknown.
pub fn video_aspect(channel: &CommandChannel) -> Option<f64> {
    let aspect = channel.get_property_double("video-params/aspect")?;
    if aspect < ASPECT_EPSILON {
        return Some(0.0);
    }
    let rotation = channel
        .get_property_int("video-params/rotate")
        .unwrap_or(0);
    Some(rotate_aspect(aspect, rotation))
}

/// Engine properties holding the selected track of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSlot {
    Video,
    Audio,
    Sub,
    SecondarySub,
}

impl TrackSlot {
    pub fn property(self) -> &'static str {
        match self {
            TrackSlot::Video => "vid",
            TrackSlot::Audio => "aid",
            TrackSlot::Sub => "sid",
            TrackSlot::SecondarySub => "secondary-sid",
        }
    }
}

/// Selected track id, or [`DISABLED_TRACK_ID`] for "no" and anything else
/// that is not a number.
pub fn selected_track(channel: &CommandChannel, slot: TrackSlot) -> i64 {
    channel
        .get_property_string(slot.property())
        .and_then(|value| value.parse().ok())
        .unwrap_or(DISABLED_TRACK_ID)
}

pub fn select_track(channel: &CommandChannel, slot: TrackSlot, id: i64) {
    if id == DISABLED_TRACK_ID {
        channel.set_property_string(slot.property(), "no");
    } else {
        channel.set_property_int(slot.property(), id);
    }
}

/// Scalar playback state as last reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub paused: bool,
    pub paused_for_cache: bool,
    pub time_pos: Option<f64>,
    pub duration: Option<f64>,
    pub speed: f64,
    pub hwdec: String,
    /// Rotation-corrected.
    pub aspect: Option<f64>,
    pub raw_aspect: Option<f64>,
    pub rotation: i64,
    pub playlist_pos: Option<i64>,
    pub playlist_count: i64,
    pub media_title: Option<String>,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            paused: false,
            paused_for_cache: false,
            time_pos: None,
            duration: None,
            speed: 1.0,
            hwdec: "no".to_string(),
            aspect: None,
            raw_aspect: None,
            rotation: 0,
            playlist_pos: None,
            playlist_count: 0,
            media_title: None,
            shuffle: false,
            repeat: RepeatMode::None,
        }
    }
}

impl PlaybackState {
    fn refresh_aspect(&mut self) {
        self.aspect = self.raw_aspect.map(|raw| {
            if raw < ASPECT_EPSILON {
                0.0
            } else {
                rotate_aspect(raw, self.rotation)
            }
        });
    }
}

/// Keeps [`PlaybackState`] and the track list in step with notifications.
pub struct Projection {
    channel: CommandChannel,
    registry: Arc<ObserverRegistry>,
    tracks: RwLock<Arc<TrackList>>,
    state: RwLock<PlaybackState>,
}

impl Projection {
    pub fn new(channel: CommandChannel, registry: Arc<ObserverRegistry>) -> Self {
        Self {
            channel,
            registry,
            tracks: RwLock::new(Arc::new(TrackList::default())),
            state: RwLock::new(PlaybackState::default()),
        }
    }

    pub fn tracks(&self) -> Arc<TrackList> {
        Arc::clone(&self.tracks.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Rebuilds the track list and replaces the current one.
    pub fn reload_tracks(&self) -> Arc<TrackList> {
        let tracks = Arc::new(load_tracks(&self.channel));
        debug!("[Tracks] Loaded {} tracks", tracks.real_count());
        *self.tracks.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&tracks);
        tracks
    }

    pub fn state(&self) -> PlaybackState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_state(&self, f: impl FnOnce(&mut PlaybackState)) {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn apply(&self, update: PropertyUpdate) {
        match update {
            PropertyUpdate::TimePos(pos) => self.update_state(|s| s.time_pos = pos),
            PropertyUpdate::Duration(duration) => self.update_state(|s| s.duration = duration),
            PropertyUpdate::Pause(paused) => {
                self.update_state(|s| s.paused = paused.unwrap_or(false))
            }
            PropertyUpdate::PausedForCache(paused) => {
                self.update_state(|s| s.paused_for_cache = paused.unwrap_or(false))
            }
            PropertyUpdate::Speed(speed) => self.update_state(|s| s.speed = speed.unwrap_or(1.0)),
            PropertyUpdate::TrackList => {
                self.reload_tracks();
            }
            PropertyUpdate::VideoAspect(aspect) => self.update_state(|s| {
                s.raw_aspect = aspect;
                s.refresh_aspect();
            }),
            PropertyUpdate::VideoRotate(rotation) => self.update_state(|s| {
                s.rotation = rotation.map(|r| r as i64).unwrap_or(0);
                s.refresh_aspect();
            }),
            PropertyUpdate::PlaylistPos(pos) => self.update_state(|s| s.playlist_pos = pos),
            PropertyUpdate::PlaylistCount(count) => {
                self.update_state(|s| s.playlist_count = count.unwrap_or(0))
            }
            PropertyUpdate::MediaTitle(title) => self.update_state(|s| s.media_title = title),
            PropertyUpdate::LoopPlaylist | PropertyUpdate::LoopFile => {
                let repeat = codec::repeat_mode(&self.channel);
                self.update_state(|s| s.repeat = repeat);
            }
            PropertyUpdate::Shuffle(shuffle) => {
                self.update_state(|s| s.shuffle = shuffle.unwrap_or(false))
            }
            PropertyUpdate::HwdecCurrent => {
                let hwdec = self
                    .channel
                    .get_property_string("hwdec-current")
                    .unwrap_or_else(|| "no".to_string());
                self.update_state(|s| s.hwdec = hwdec);
            }
            PropertyUpdate::VideoFormat | PropertyUpdate::Metadata => {}
            PropertyUpdate::Other { name, .. } => {
                trace!("[Projection] No projection for '{}'", name);
            }
        }
    }
}

impl EventObserver for Projection {
    fn event_property(&self, change: &PropertyChange) {
        if let Some(update) = self.registry.decode(change) {
            self.apply(update);
        }
    }

    fn event(&self, id: EventId) {
        if id == EventId::QueueOverflow {
            warn!("[Projection] Engine dropped events, state may be stale");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChapterEntry, Core, PlaylistEntry, TrackEntry};
    use crate::engine::{Engine, PropertyValue};
    use std::time::{Duration, Instant};

    fn setup() -> (Arc<Core>, CommandChannel) {
        let core = Arc::new(Core::with_defaults());
        core.init().unwrap();
        let channel = CommandChannel::new(core.clone());
        (core, channel)
    }

    fn track(id: i64, kind: &str, lang: Option<&str>, title: Option<&str>) -> TrackEntry {
        TrackEntry {
            id,
            kind: kind.to_string(),
            lang: lang.map(str::to_string),
            title: title.map(str::to_string),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_display_names() {
        assert_eq!(track_display_name(1, Some("eng"), Some("Commentary")), "#1: Commentary (eng)");
        assert_eq!(track_display_name(2, Some("jpn"), None), "#2: jpn");
        assert_eq!(track_display_name(3, None, Some("Signs")), "#3: Signs");
        assert_eq!(track_display_name(4, Some(""), None), "#4");
    }

    #[test]
    fn test_sentinel_heads_every_group() {
        let (core, channel) = setup();
        core.set_track_list(&[track(1, "audio", Some("eng"), None)]);

        let tracks = load_tracks(&channel);
        for kind in TrackKind::ALL {
            let group = tracks.get(kind);
            assert!(group[0].is_disabled());
            assert!(group[1..].iter().all(|t| !t.is_disabled()));
        }
        assert_eq!(tracks.get(TrackKind::Audio)[1].name, "#1: eng");
        assert_eq!(tracks.get(TrackKind::Video).len(), 1);
    }

    #[test]
    fn test_unknown_types_and_vanished_entries_are_skipped() {
        let (core, channel) = setup();
        core.set_track_list(&[
            track(1, "video", None, None),
            track(1, "audio", None, Some("Main")),
            track(2, "image", None, None),
            track(1, "sub", Some("fre"), Some("Full")),
        ]);
        core.remove_property("track-list/1/id");
        core.remove_property("track-list/0/type");

        let tracks = load_tracks(&channel);
        assert_eq!(tracks.real_count(), 1);
        assert_eq!(tracks.get(TrackKind::Sub)[1].name, "#1: Full (fre)");
    }

    #[test]
    fn test_reload_replaces_previous_tracks() {
        let (core, channel) = setup();
        let projection = Projection::new(channel, Arc::new(ObserverRegistry::new()));
        core.set_track_list(&[track(1, "audio", None, None), track(2, "audio", None, None)]);
        assert_eq!(projection.reload_tracks().get(TrackKind::Audio).len(), 3);

        core.set_track_list(&[track(5, "video", None, None)]);
        let tracks = projection.reload_tracks();
        assert_eq!(tracks.get(TrackKind::Audio).len(), 1);
        assert_eq!(projection.tracks().get(TrackKind::Video)[1].engine_id, 5);
    }

    #[test]
    fn test_load_playlist_and_chapters() {
        let (core, channel) = setup();
        core.set_playlist(&[
            PlaylistEntry {
                filename: "/a.mkv".to_string(),
                title: Some("Alpha".to_string()),
            },
            PlaylistEntry {
                filename: "/b.mkv".to_string(),
                title: None,
            },
        ]);
        core.set_chapter_list(&[
            ChapterEntry {
                title: Some("Intro".to_string()),
                time: 0.0,
            },
            ChapterEntry {
                title: None,
                time: 95.5,
            },
        ]);

        let playlist = load_playlist(&channel);
        assert_eq!(playlist.len(), 2);
        assert_eq!(playlist[0].title.as_deref(), Some("Alpha"));
        assert_eq!(playlist[1].index, 1);
        assert_eq!(playlist[1].title, None);

        let chapters = load_chapters(&channel);
        assert_eq!(chapters[1].time, 95.5);
        assert_eq!(chapters[1].title, None);

        core.remove_property("playlist/0/filename");
        let playlist = load_playlist(&channel);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist[0].filename, "/b.mkv");
    }

    #[test]
    fn test_video_aspect() {
        let (core, channel) = setup();
        assert_eq!(video_aspect(&channel), None);

        core.add_property("video-params/aspect", PropertyValue::Double(16.0 / 9.0));
        core.add_property("video-params/rotate", PropertyValue::Int64(90));
        assert!((video_aspect(&channel).unwrap() - 0.5625).abs() < 1e-9);

        core.add_property("video-params/rotate", PropertyValue::Int64(0));
        assert!((video_aspect(&channel).unwrap() - 16.0 / 9.0).abs() < 1e-9);

        core.add_property("video-params/rotate", PropertyValue::Int64(270));
        assert!((video_aspect(&channel).unwrap() - 0.5625).abs() < 1e-9);

        core.add_property("video-params/aspect", PropertyValue::Double(0.0005));
        core.add_property("video-params/rotate", PropertyValue::Int64(90));
        assert_eq!(video_aspect(&channel), Some(0.0));
    }

    #[test]
    fn test_track_selection() {
        let (_core, channel) = setup();
        assert_eq!(selected_track(&channel, TrackSlot::Audio), DISABLED_TRACK_ID);

        select_track(&channel, TrackSlot::Audio, 2);
        assert_eq!(selected_track(&channel, TrackSlot::Audio), 2);

        select_track(&channel, TrackSlot::Audio, DISABLED_TRACK_ID);
        assert_eq!(
            channel.get_property_string("aid"),
            Some("no".to_string())
        );
        assert_eq!(selected_track(&channel, TrackSlot::SecondarySub), DISABLED_TRACK_ID);
    }

    #[test]
    fn test_projection_follows_notifications() {
        let (core, channel) = setup();
        let registry = Arc::new(ObserverRegistry::new());
        let projection = Arc::new(Projection::new(channel.clone(), Arc::clone(&registry)));
        core.add_observer(projection.clone());
        registry.observe_all(&channel);

        core.set_track_list(&[track(3, "sub", None, None)]);
        channel.set_property_double("speed", 1.5);
        channel.set_property_string("loop-file", "inf");
        core.add_property("video-params/aspect", PropertyValue::Double(2.0));
        core.add_property("video-params/rotate", PropertyValue::Double(90.0));

        assert!(wait_for(|| {
            let state = projection.state();
            state.speed == 1.5
                && state.repeat == RepeatMode::RepeatFile
                && state.aspect == Some(0.5)
                && projection.tracks().get(TrackKind::Sub).len() == 2
        }));
    }
}
