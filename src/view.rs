//! The player session bound to one rendering surface.
//!
//! `PlayerView` owns everything between the UI and the engine: option setup
//! around init, the property registry and projection, input mapping and the
//! surface glue. Call [`PlayerView::initialize`] once before use and
//! [`PlayerView::destroy`] once before dropping it.

use crate::channel::CommandChannel;
use crate::codec::{self, RepeatMode};
use crate::config::{Debanding, PlayerOptions};
use crate::core::lock;
use crate::datasource::{DATA_SOURCE_SCHEME, FileDataSourceFactory};
use crate::engine::{Engine, EventObserver, LogLevel, LogMessage, PropertyChange, Result};
use crate::input::{InputMapper, KeyEvent};
use crate::projection::{
    self, Chapter, PlaybackState, PlaylistItem, Projection, TrackList, TrackSlot,
};
use crate::registry::ObserverRegistry;
use std::sync::{Arc, Mutex};
use tracing::*;

const DEFAULT_VO: &str = "gpu";

/// Forwards engine log messages into `tracing`.
struct EngineLog;

impl EventObserver for EngineLog {
    fn event_property(&self, _change: &PropertyChange) {}

    fn log_message(&self, message: &LogMessage) {
        let text = message.text.trim_end();
        match message.level {
            LogLevel::Fatal | LogLevel::Error => error!("[{}] {}", message.prefix, text),
            LogLevel::Warn => warn!("[{}] {}", message.prefix, text),
            LogLevel::Info => info!("[{}] {}", message.prefix, text),
            LogLevel::Verbose | LogLevel::Debug => debug!("[{}] {}", message.prefix, text),
            LogLevel::Trace => trace!("[{}] {}", message.prefix, text),
        }
    }
}

struct Session {
    initialized: bool,
    /// Loaded as soon as a surface shows up, then cleared.
    pending_file: Option<String>,
    /// Restored whenever a surface comes back.
    vo_in_use: String,
    surface_attached: bool,
    listeners: Vec<Arc<dyn EventObserver>>,
}

pub struct PlayerView {
    channel: CommandChannel,
    registry: Arc<ObserverRegistry>,
    projection: Arc<Projection>,
    engine_log: Arc<dyn EventObserver>,
    input: InputMapper,
    session: Mutex<Session>,
}

impl PlayerView {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        let channel = CommandChannel::new(engine);
        let registry = Arc::new(ObserverRegistry::new());
        let projection = Arc::new(Projection::new(channel.clone(), Arc::clone(&registry)));
        Self {
            input: InputMapper::new(channel.clone()),
            channel,
            registry,
            projection,
            engine_log: Arc::new(EngineLog),
            session: Mutex::new(Session {
                initialized: false,
                pending_file: None,
                vo_in_use: DEFAULT_VO.to_string(),
                surface_attached: false,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn registry(&self) -> &ObserverRegistry {
        &self.registry
    }

    pub fn initialize(&self, config_dir: &str, cache_dir: &str, options: &PlayerOptions) -> Result<()> {
        // Files handed to play_file are opened through this factory
        self.channel
            .set_data_source_factory(Arc::new(FileDataSourceFactory));

        // User-supplied engine config may override everything below
        self.channel.set_option_string("config", "yes");
        self.channel.set_option_string("config-dir", config_dir);
        for option in ["gpu-shader-cache-dir", "icc-cache-dir"] {
            self.channel.set_option_string(option, cache_dir);
        }
        self.init_options(options);

        self.channel.engine().init()?;

        self.post_init_options();
        // Would fail before a surface is attached
        self.channel.set_option_string("force-window", "no");
        // Needed for play_file to work
        self.channel.set_option_string("idle", "once");
        self.channel.set_option_string("seekbarkeyframes", "no");

        self.channel.add_observer(self.projection.clone());
        self.channel.add_observer(Arc::clone(&self.engine_log));
        self.registry.observe_all(&self.channel);

        lock(&self.session).initialized = true;
        info!(
            "[View] Initialized, observing {} properties",
            self.registry.len()
        );
        Ok(())
    }

    fn init_options(&self, options: &PlayerOptions) {
        let channel = &self.channel;
        channel.set_option_string("profile", "fast");
        self.set_vo(options.vo());

        if let Some(fps) = options.display_fps {
            debug!("[View] Display reports {} fps", fps);
            channel.set_option_string("display-fps-override", &fps.to_string());
        }

        for (option, value) in &options.passthrough {
            channel.set_option_string(option, value);
        }

        match options.debanding {
            Some(Debanding::Gradfun) => channel.set_option_string("vf", "gradfun=radius=12"),
            Some(Debanding::Gpu) => channel.set_option_string("deband", "yes"),
            None => {}
        }

        channel.set_option_string("video-sync", &options.video_sync);
        if options.interpolation {
            channel.set_option_string("interpolation", "yes");
        }
        if options.gpu_debug {
            channel.set_option_string("gpu-debug", "yes");
        }
        if options.fast_decode {
            channel.set_option_string("vd-lavc-fast", "yes");
            channel.set_option_string("vd-lavc-skiploopfilter", "nonkey");
        }

        channel.set_option_string("gpu-context", "android");
        channel.set_option_string("opengl-es", "yes");
        channel.set_option_string("hwdec", options.hwdec());
        channel.set_option_string("hwdec-codecs", "h264,hevc,mpeg4,mpeg2video,vp8,vp9,av1");
        channel.set_option_string("ao", "audiotrack,opensles");
        channel.set_option_string("tls-verify", "yes");
        if let Some(ca_file) = &options.tls_ca_file {
            channel.set_option_string("tls-ca-file", ca_file);
        }
        channel.set_option_string("input-default-bindings", "yes");

        let cache_bytes = options.demuxer_cache_bytes().to_string();
        channel.set_option_string("demuxer-max-bytes", &cache_bytes);
        channel.set_option_string("demuxer-max-back-bytes", &cache_bytes);

        if let Some(dir) = &options.screenshot_dir {
            channel.set_option_string("screenshot-directory", dir);
        }
        channel.set_option_string("vd-lavc-film-grain", "cpu");
    }

    fn post_init_options(&self) {
        // Watch-later files are written explicitly
        self.channel.set_option_string("save-position-on-quit", "no");
    }

    /// Detaches every observer and registration, then destroys the engine.
    pub fn destroy(&self) {
        let listeners = {
            let mut session = lock(&self.session);
            if !session.initialized {
                return;
            }
            session.initialized = false;
            std::mem::take(&mut session.listeners)
        };

        for listener in &listeners {
            self.channel.remove_observer(listener);
        }
        let projection: Arc<dyn EventObserver> = self.projection.clone();
        self.channel.remove_observer(&projection);
        self.channel.remove_observer(&self.engine_log);
        self.registry.unobserve_all(&self.channel);

        debug!("[View] Destroying engine");
        self.channel.engine().destroy();
    }

    // Observers

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        lock(&self.session).listeners.push(Arc::clone(&observer));
        self.channel.add_observer(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn EventObserver>) {
        lock(&self.session)
            .listeners
            .retain(|o| !Arc::ptr_eq(o, observer));
        self.channel.remove_observer(observer);
    }

    // Surface

    /// Sets the first file to play once a surface is available.
    pub fn play_file(&self, path: &str) {
        lock(&self.session).pending_file = Some(path.to_string());
    }

    /// The VO is turned off while no surface exists and restored afterwards.
    pub fn set_vo(&self, vo: &str) {
        lock(&self.session).vo_in_use = vo.to_string();
        self.channel.set_option_string("vo", vo);
    }

    pub fn surface_created(&self) {
        warn!("[View] Attaching surface");
        let (pending_file, vo) = {
            let mut session = lock(&self.session);
            session.surface_attached = true;
            (session.pending_file.take(), session.vo_in_use.clone())
        };
        // Render OSD and subtitles into the surface even without video
        self.channel.set_option_string("force-window", "yes");

        match pending_file {
            Some(path) => self
                .channel
                .command(&["loadfile", &format!("{DATA_SOURCE_SCHEME}://{path}")]),
            None => self.channel.set_property_string("vo", &vo),
        }
    }

    pub fn surface_changed(&self, width: u32, height: u32) {
        self.channel
            .set_property_string("android-surface-size", &format!("{width}x{height}"));
    }

    /// Output is disabled asynchronously: the engine may still be drawing
    /// into the old surface for a moment after this returns.
    pub fn surface_destroyed(&self) {
        warn!("[View] Detaching surface");
        self.channel.set_property_string("vo", "null");
        self.channel.set_option_string("force-window", "no");
        lock(&self.session).surface_attached = false;
    }

    pub fn surface_attached(&self) -> bool {
        lock(&self.session).surface_attached
    }

    // Input

    pub fn map_key_event(&self, event: &KeyEvent) -> bool {
        self.input.map_key_event(event)
    }

    pub fn tap_key(&self, code: i32, ch: Option<char>) -> bool {
        self.input.tap_key(code, ch)
    }

    pub fn map_pointer_scroll(&self, horizontal: f64, vertical: f64) -> bool {
        self.input.map_pointer_scroll(horizontal, vertical)
    }

    // Projected state

    pub fn state(&self) -> PlaybackState {
        self.projection.state()
    }

    pub fn tracks(&self) -> Arc<TrackList> {
        self.projection.tracks()
    }

    pub fn load_tracks(&self) -> Arc<TrackList> {
        self.projection.reload_tracks()
    }

    pub fn load_playlist(&self) -> Vec<PlaylistItem> {
        projection::load_playlist(&self.channel)
    }

    pub fn load_chapters(&self) -> Vec<Chapter> {
        projection::load_chapters(&self.channel)
    }

    pub fn video_aspect(&self) -> Option<f64> {
        projection::video_aspect(&self.channel)
    }

    pub fn selected_track(&self, slot: TrackSlot) -> i64 {
        projection::selected_track(&self.channel, slot)
    }

    pub fn select_track(&self, slot: TrackSlot, id: i64) {
        projection::select_track(&self.channel, slot, id)
    }

    // Derived state

    pub fn repeat_mode(&self) -> RepeatMode {
        codec::repeat_mode(&self.channel)
    }

    pub fn cycle_repeat(&self) -> RepeatMode {
        codec::cycle_repeat(&self.channel)
    }

    pub fn shuffle(&self) -> bool {
        codec::shuffle(&self.channel)
    }

    pub fn set_shuffle(&self, cycle: bool, value: bool) -> bool {
        codec::change_shuffle(&self.channel, cycle, value)
    }

    pub fn cycle_speed(&self) -> f64 {
        codec::cycle_speed(&self.channel)
    }

    // Plain properties

    pub fn paused(&self) -> Option<bool> {
        self.channel.get_property_flag("pause")
    }

    pub fn set_paused(&self, paused: bool) {
        self.channel.set_property_flag("pause", paused);
    }

    pub fn duration(&self) -> Option<f64> {
        self.channel.get_property_double("duration")
    }

    pub fn time_pos(&self) -> Option<f64> {
        self.channel.get_property_double("time-pos")
    }

    pub fn seek_to(&self, position: f64) {
        self.channel
            .command(&["seek", &position.to_string(), "exact+absolute"]);
    }

    pub fn hwdec_active(&self) -> String {
        self.channel
            .get_property_string("hwdec-current")
            .unwrap_or_else(|| "no".to_string())
    }

    pub fn playback_speed(&self) -> Option<f64> {
        self.channel.get_property_double("speed")
    }

    pub fn set_playback_speed(&self, speed: f64) {
        self.channel.set_property_double("speed", speed);
    }

    pub fn sub_delay(&self) -> Option<f64> {
        self.channel.get_property_double("sub-delay")
    }

    pub fn set_sub_delay(&self, delay: f64) {
        self.channel.set_property_double("sub-delay", delay);
    }

    pub fn secondary_sub_delay(&self) -> Option<f64> {
        self.channel.get_property_double("secondary-sub-delay")
    }

    pub fn set_secondary_sub_delay(&self, delay: f64) {
        self.channel.set_property_double("secondary-sub-delay", delay);
    }

    pub fn estimated_vf_fps(&self) -> Option<f64> {
        self.channel.get_property_double("estimated-vf-fps")
    }

    // Commands

    pub fn cycle_pause(&self) {
        self.channel.command(&["cycle", "pause"]);
    }

    pub fn cycle_audio(&self) {
        self.channel.command(&["cycle", "audio"]);
    }

    pub fn cycle_sub(&self) {
        self.channel.command(&["cycle", "sub"]);
    }

    pub fn cycle_hwdec(&self) {
        self.channel.command(&["cycle-values", "hwdec", "auto", "no"]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Core, TrackEntry};
    use crate::engine::{EventId, PropertyValue};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn view() -> (Arc<Core>, PlayerView) {
        let core = Arc::new(Core::with_defaults());
        let view = PlayerView::new(core.clone());
        (core, view)
    }

    fn initialized() -> (Arc<Core>, PlayerView) {
        let (core, view) = view();
        view.initialize("/data/config", "/data/cache", &PlayerOptions::default())
            .unwrap();
        (core, view)
    }

    fn history(core: &Core) -> Vec<String> {
        core.command_history()
            .into_iter()
            .map(|args| args.join(" "))
            .collect()
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

    fn text(value: &str) -> Option<PropertyValue> {
        Some(PropertyValue::String(value.to_string()))
    }

    #[test]
    fn test_initialize_applies_options() {
        let (core, view) = view();
        let options = PlayerOptions {
            gpu_next: true,
            debanding: Some(Debanding::Gpu),
            fast_decode: true,
            demuxer_cache_megs: 32,
            ..PlayerOptions::default()
        };
        view.initialize("/data/config", "/data/cache", &options).unwrap();

        assert_eq!(core.option("config"), text("yes"));
        assert_eq!(core.option("config-dir"), text("/data/config"));
        assert_eq!(core.option("icc-cache-dir"), text("/data/cache"));
        assert_eq!(core.option("profile"), text("fast"));
        assert_eq!(core.option("vo"), text("gpu-next"));
        assert_eq!(core.option("hwdec"), text("auto"));
        assert_eq!(core.option("deband"), text("yes"));
        assert_eq!(core.option("vd-lavc-skiploopfilter"), text("nonkey"));
        assert_eq!(core.option("demuxer-max-back-bytes"), text("33554432"));
        assert_eq!(core.option("save-position-on-quit"), text("no"));
        assert_eq!(core.option("idle"), text("once"));
        assert_eq!(core.option("vf"), None);
        assert_eq!(view.registry().len(), crate::registry::OBSERVED_PROPERTIES.len());
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (_core, view) = initialized();
        assert!(view
            .initialize("/data/config", "/data/cache", &PlayerOptions::default())
            .is_err());
    }

    #[test]
    fn test_pending_file_loaded_on_surface() {
        let mut movie = tempfile::NamedTempFile::new().unwrap();
        movie.write_all(&[0u8; 2048]).unwrap();
        movie.flush().unwrap();
        let path = movie.path().display().to_string();

        let (core, view) = initialized();
        view.play_file(&path);
        view.surface_created();
        assert!(view.surface_attached());
        assert_eq!(history(&core), vec![format!("loadfile datasource://{path}")]);
        assert_eq!(core.option("force-window"), text("yes"));
        assert_eq!(view.channel().get_property_string("path"), Some(format!("datasource://{path}")));
        assert_eq!(view.channel().get_property_int("file-size"), Some(2048));

        let mut header = [0xffu8; 16];
        assert_eq!(core.read_stream(&mut header), Ok(16));
        assert_eq!(header, [0u8; 16]);

        view.surface_destroyed();
        assert_eq!(view.channel().get_property_string("vo"), Some("null".to_string()));
        assert_eq!(core.option("force-window"), text("no"));

        view.surface_created();
        assert_eq!(history(&core).len(), 1);
        assert_eq!(view.channel().get_property_string("vo"), Some("gpu".to_string()));
    }

    #[test]
    fn test_missing_pending_file_is_not_fatal() {
        let (core, view) = initialized();
        view.play_file("/sdcard/missing.mkv");
        view.surface_created();
        assert_eq!(view.channel().get_property_int("playlist-pos"), Some(-1));
        assert!(core.read_stream(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn test_surface_size() {
        let (_core, view) = initialized();
        view.surface_changed(1920, 1080);
        assert_eq!(
            view.channel().get_property_string("android-surface-size"),
            Some("1920x1080".to_string())
        );
    }

    #[test]
    fn test_seek_and_accessors() {
        let (core, view) = initialized();
        assert_eq!(view.hwdec_active(), "no");
        assert_eq!(view.time_pos(), None);

        view.channel().command(&["loadfile", "/a.mkv"]);
        core.clear_command_history();
        view.seek_to(12.5);
        assert_eq!(history(&core), vec!["seek 12.5 exact+absolute"]);
        assert_eq!(view.time_pos(), Some(12.5));

        view.set_sub_delay(0.25);
        assert_eq!(view.sub_delay(), Some(0.25));
        assert_eq!(view.secondary_sub_delay(), Some(0.0));
        assert_eq!(view.estimated_vf_fps(), None);

        view.cycle_hwdec();
        assert_eq!(view.channel().get_property_string("hwdec"), Some("no".to_string()));
    }

    #[test]
    fn test_state_follows_engine() {
        let (core, view) = initialized();
        core.set_track_list(&[TrackEntry {
            id: 1,
            kind: "audio".to_string(),
            lang: Some("eng".to_string()),
            title: None,
        }]);
        view.cycle_pause();
        view.cycle_repeat();
        view.set_shuffle(true, true);

        assert!(wait_for(|| {
            let state = view.state();
            state.paused && state.repeat == RepeatMode::RepeatPlaylist && state.shuffle
        }));
        assert!(wait_for(|| view.tracks().real_count() == 1));
        assert_eq!(view.selected_track(TrackSlot::Audio), -1);

        view.cycle_audio();
        assert_eq!(view.selected_track(TrackSlot::Audio), 1);
    }

    struct Counter(AtomicUsize);

    impl EventObserver for Counter {
        fn event_property(&self, _change: &PropertyChange) {}

        fn event(&self, id: EventId) {
            if id == EventId::FileLoaded {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_destroy_detaches_everything() {
        let (core, view) = initialized();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        view.add_observer(counter.clone());
        assert_eq!(core.observer_count(), 3);

        view.channel().command(&["loadfile", "/a.mkv"]);
        assert!(wait_for(|| counter.0.load(Ordering::SeqCst) == 1));

        view.destroy();
        assert_eq!(core.observer_count(), 0);
        assert!(view.registry().is_empty());

        // Best effort after teardown: nothing panics, nothing is delivered
        view.cycle_pause();
        view.surface_destroyed();
        assert_eq!(view.paused(), None);
        view.destroy();
    }
}
