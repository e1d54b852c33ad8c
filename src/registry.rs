//! Which engine properties are watched, and how their notifications decode.

use crate::channel::CommandChannel;
use crate::engine::{Format, PropertyChange, PropertyValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::*;

/// Every property the player watches, with the format it is observed in.
///
/// `Format::None` entries only signal that something changed; the receiver
/// re-queries the typed values it needs.
pub const OBSERVED_PROPERTIES: &[(&str, Format)] = &[
    ("time-pos", Format::Double),
    ("duration/full", Format::Double),
    ("pause", Format::Flag),
    ("paused-for-cache", Format::Flag),
    ("speed", Format::String),
    ("track-list", Format::None),
    ("video-params/aspect", Format::Double),
    ("video-params/rotate", Format::Double),
    ("playlist-pos", Format::Int64),
    ("playlist-count", Format::Int64),
    ("video-format", Format::None),
    ("media-title", Format::String),
    ("metadata", Format::None),
    ("loop-playlist", Format::None),
    ("loop-file", Format::None),
    ("shuffle", Format::Flag),
    ("hwdec-current", Format::None),
];

/// A notification decoded into application terms.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
    TimePos(Option<f64>),
    Duration(Option<f64>),
    Pause(Option<bool>),
    PausedForCache(Option<bool>),
    Speed(Option<f64>),
    TrackList,
    VideoAspect(Option<f64>),
    VideoRotate(Option<f64>),
    PlaylistPos(Option<i64>),
    PlaylistCount(Option<i64>),
    VideoFormat,
    MediaTitle(Option<String>),
    Metadata,
    LoopPlaylist,
    LoopFile,
    Shuffle(Option<bool>),
    HwdecCurrent,
    Other { name: String, value: PropertyValue },
}

impl PropertyUpdate {
    fn project(name: &str, value: &PropertyValue) -> Self {
        match name {
            "time-pos" => PropertyUpdate::TimePos(value.as_double()),
            "duration" | "duration/full" => PropertyUpdate::Duration(value.as_double()),
            "pause" => PropertyUpdate::Pause(value.as_flag()),
            "paused-for-cache" => PropertyUpdate::PausedForCache(value.as_flag()),
            // Observed as a string so that the notification keeps full precision
            "speed" => PropertyUpdate::Speed(value.as_str().and_then(|s| s.trim().parse().ok())),
            "track-list" => PropertyUpdate::TrackList,
            "video-params/aspect" => PropertyUpdate::VideoAspect(value.as_double()),
            "video-params/rotate" => PropertyUpdate::VideoRotate(value.as_double()),
            "playlist-pos" => PropertyUpdate::PlaylistPos(value.as_int()),
            "playlist-count" => PropertyUpdate::PlaylistCount(value.as_int()),
            "video-format" => PropertyUpdate::VideoFormat,
            "media-title" => PropertyUpdate::MediaTitle(value.as_str().map(str::to_string)),
            "metadata" => PropertyUpdate::Metadata,
            "loop-playlist" => PropertyUpdate::LoopPlaylist,
            "loop-file" => PropertyUpdate::LoopFile,
            "shuffle" => PropertyUpdate::Shuffle(value.as_flag()),
            "hwdec-current" => PropertyUpdate::HwdecCurrent,
            _ => PropertyUpdate::Other {
                name: name.to_string(),
                value: value.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Registration {
    format: Format,
    reply_id: u64,
}

/// Maps property path to declared format.
///
/// Each path is registered with the engine at most once, under its own reply
/// id; notifications carrying any other id are treated as foreign. Ids are
/// never reused, not even after [`ObserverRegistry::unobserve_all`].
#[derive(Default)]
pub struct ObserverRegistry {
    entries: RwLock<HashMap<String, Registration>>,
    last_reply_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` with the engine. Returns `false` if it was already
    /// registered, in which case nothing is sent.
    pub fn observe(&self, channel: &CommandChannel, path: &str, format: Format) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(path) {
            if existing.format != format {
                warn!(
                    "[Registry] '{}' already observed as {:?}, ignoring {:?}",
                    path, existing.format, format
                );
            }
            return false;
        }

        let reply_id = self.last_reply_id.fetch_add(1, Ordering::Relaxed) + 1;
        if !channel.observe_property(path, format, reply_id) {
            return false;
        }
        entries.insert(path.to_string(), Registration { format, reply_id });
        true
    }

    pub fn observe_all(&self, channel: &CommandChannel) {
        for (path, format) in OBSERVED_PROPERTIES {
            self.observe(channel, path, *format);
        }
    }

    /// Stops every registration. Must run before the engine handle goes away.
    pub fn unobserve_all(&self, channel: &CommandChannel) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for registration in entries.values() {
            channel.unobserve_property(registration.reply_id);
        }
        entries.clear();
    }

    pub fn format_of(&self, path: &str) -> Option<Format> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|r| r.format)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks a raw notification against its declared format and decodes it.
    pub fn decode(&self, change: &PropertyChange) -> Option<PropertyUpdate> {
        let registration = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&change.name)
            .copied();
        let Some(registration) = registration else {
            trace!("[Registry] Ignoring unobserved property '{}'", change.name);
            return None;
        };
        if registration.reply_id != change.reply_id {
            trace!(
                "[Registry] Ignoring '{}' delivered for reply id {}",
                change.name, change.reply_id
            );
            return None;
        }

        let value = if registration.format.carries_value() {
            if change.value != PropertyValue::None && change.value.format() != registration.format
            {
                warn!(
                    "[Registry] '{}' arrived as {:?}, expected {:?}",
                    change.name,
                    change.value.format(),
                    registration.format
                );
                return None;
            }
            change.value.clone()
        } else {
            PropertyValue::None
        };
        Some(PropertyUpdate::project(&change.name, &value))
    }
}
