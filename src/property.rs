use crate::core::*;
use crate::engine::PropertyValue;

pub fn register_property(core: &Core) {
    // Playback properties
    core.add_property("pause", PropertyValue::Flag(false));
    core.add_property("paused-for-cache", PropertyValue::Flag(false));
    core.add_property("speed", PropertyValue::Double(1.0));
    core.add_property("time-pos", PropertyValue::None);
    core.add_property("duration", PropertyValue::None);
    core.add_property("estimated-vf-fps", PropertyValue::None);
    core.add_property("sub-delay", PropertyValue::Double(0.0));
    core.add_property("secondary-sub-delay", PropertyValue::Double(0.0));

    // Current file
    core.add_property("path", PropertyValue::None);
    core.add_property("filename", PropertyValue::None);
    core.add_property("media-title", PropertyValue::None);
    core.add_property("metadata", PropertyValue::None);
    core.add_property("video-format", PropertyValue::None);
    core.add_property("video-params/aspect", PropertyValue::None);
    core.add_property("video-params/rotate", PropertyValue::None);

    // Playlist and looping; loop values are "no", "inf" or a count
    core.add_property("playlist-pos", PropertyValue::Int64(-1));
    core.add_property("loop-playlist", PropertyValue::String("no".to_string()));
    core.add_property("loop-file", PropertyValue::String("no".to_string()));
    core.add_property("shuffle", PropertyValue::Flag(false));
    core.set_playlist(&[]);

    // Track selection is "no", "auto" or a track id
    core.add_property("vid", PropertyValue::String("no".to_string()));
    core.add_property("aid", PropertyValue::String("no".to_string()));
    core.add_property("sid", PropertyValue::String("no".to_string()));
    core.add_property("secondary-sid", PropertyValue::String("no".to_string()));
    core.set_track_list(&[]);
    core.set_chapter_list(&[]);

    // Output and decoding
    core.add_property("vo", PropertyValue::String("gpu".to_string()));
    core.add_property("force-window", PropertyValue::String("no".to_string()));
    core.add_property("hwdec", PropertyValue::String("no".to_string()));
    core.add_property("hwdec-current", PropertyValue::None);
    core.add_property("android-surface-size", PropertyValue::String(String::new()));
}
