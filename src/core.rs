//! In-process engine.
//!
//! `Core` implements [`Engine`] over a flat property store keyed by path
//! (`track-list/0/type`, `playlist-count`, ...) and a table of named commands.
//! Changes to observed properties are queued on a bounded ring buffer and
//! delivered to observers from a dedicated event thread, so callers see the
//! same asynchronous behaviour they would get from a native engine.
//!
//! `datasource://` files are opened through the registered
//! [`DataSourceFactory`]; the stream stays open until the next file starts.

use crate::datasource::{self, DATA_SOURCE_SCHEME, DataSource, DataSourceFactory};
use crate::engine::{
    Engine, EngineEvent, EventId, EventObserver, Format, LogLevel, LogMessage, PropertyChange,
    PropertyValue, Result,
};
use crate::error::EngineError;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::*;

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Commands longer than this are rejected outright.
pub const MAX_COMMAND_ARGS: usize = 127;

pub type CommandCallback = Arc<dyn Fn(&[String], &mut CoreState) -> Result<()> + Send + Sync>;

pub struct Command {
    pub execute: CommandCallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub filename: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub id: i64,
    pub kind: String,
    pub lang: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChapterEntry {
    pub title: Option<String>,
    pub time: f64,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutable engine state handed to command callbacks.
///
/// Every write records the touched path; the owning [`Core`] turns those
/// into notifications once the callback returns.
#[derive(Default)]
pub struct CoreState {
    properties: HashMap<String, PropertyValue>,
    options: HashMap<String, PropertyValue>,
    changed: Vec<String>,
    events: Vec<EventId>,
    logs: Vec<LogMessage>,
    history: Vec<Vec<String>>,
    unshuffled: Option<Vec<PlaylistEntry>>,
    data_sources: Option<Arc<dyn DataSourceFactory>>,
    stream: Option<OpenStream>,
}

struct OpenStream {
    url: String,
    source: Box<dyn DataSource>,
}

impl CoreState {
    fn resolve<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.properties.contains_key(name) {
            return Some(name);
        }
        // "time-pos/full" and friends only differ in precision
        name.strip_suffix("/full")
            .filter(|base| self.properties.contains_key(*base))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Current value, or `None` if the property is missing or unavailable.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        let key = self.resolve(name)?;
        self.properties
            .get(key)
            .filter(|value| **value != PropertyValue::None)
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name)?.convert(Format::String)?.into_string()
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name)?.convert(Format::Int64)?.as_int()
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name)?.convert(Format::Double)?.as_double()
    }

    pub fn get_flag(&self, name: &str) -> Option<bool> {
        self.get(name)?.convert(Format::Flag)?.as_flag()
    }

    /// Adds or replaces a property without coercing the value.
    pub fn insert(&mut self, name: &str, value: PropertyValue) {
        let previous = self.properties.insert(name.to_string(), value.clone());
        if previous.as_ref() != Some(&value) {
            self.mark_changed(name);
        }
    }

    pub fn remove(&mut self, name: &str) {
        if self.properties.remove(name).is_some() {
            self.mark_changed(name);
        }
    }

    /// Writes an existing property, coercing the value to its native format.
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        let key = self
            .resolve(name)
            .ok_or_else(|| EngineError::PropertyUnavailable(name.to_string()))?
            .to_string();
        let coerced = match self.properties.get(&key).map(PropertyValue::format) {
            None | Some(Format::None) => value,
            Some(format) => value
                .convert(format)
                .ok_or_else(|| EngineError::FormatMismatch {
                    name: name.to_string(),
                    format,
                })?,
        };
        self.insert(&key, coerced);
        Ok(())
    }

    /// Writes an existing property from its textual form.
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        self.set(name, PropertyValue::String(value.to_string()))
    }

    pub fn option(&self, name: &str) -> Option<&PropertyValue> {
        self.options.get(name)
    }

    pub fn emit(&mut self, event: EventId) {
        self.events.push(event);
    }

    pub fn log(&mut self, level: LogLevel, text: impl Into<String>) {
        self.logs.push(LogMessage {
            prefix: "cplayer".to_string(),
            level,
            text: text.into(),
        });
    }

    fn mark_changed(&mut self, name: &str) {
        if !self.changed.iter().any(|path| path == name) {
            self.changed.push(name.to_string());
        }
    }

    // Playlist

    pub fn playlist(&self) -> Vec<PlaylistEntry> {
        let count = self.get_int("playlist-count").unwrap_or(0);
        (0..count)
            .filter_map(|i| {
                let filename = self.get_str(&format!("playlist/{i}/filename"))?;
                let title = self.get_str(&format!("playlist/{i}/title"));
                Some(PlaylistEntry { filename, title })
            })
            .collect()
    }

    pub fn write_playlist(&mut self, entries: &[PlaylistEntry]) {
        let old_count = self.get_int("playlist-count").unwrap_or(0);
        for i in entries.len() as i64..old_count {
            self.remove(&format!("playlist/{i}/filename"));
            self.remove(&format!("playlist/{i}/title"));
        }
        for (i, entry) in entries.iter().enumerate() {
            self.insert(
                &format!("playlist/{i}/filename"),
                PropertyValue::String(entry.filename.clone()),
            );
            match &entry.title {
                Some(title) => self.insert(
                    &format!("playlist/{i}/title"),
                    PropertyValue::String(title.clone()),
                ),
                None => self.remove(&format!("playlist/{i}/title")),
            }
        }
        self.insert("playlist-count", PropertyValue::Int64(entries.len() as i64));
    }

    pub fn take_unshuffled(&mut self) -> Option<Vec<PlaylistEntry>> {
        self.unshuffled.take()
    }

    pub fn remember_unshuffled(&mut self, entries: Vec<PlaylistEntry>) {
        if self.unshuffled.is_none() {
            self.unshuffled = Some(entries);
        }
    }

    /// Makes the playlist entry at `pos` the current file.
    pub fn start_entry(&mut self, pos: usize) -> Result<()> {
        let entries = self.playlist();
        let entry = entries
            .get(pos)
            .ok_or_else(|| EngineError::invalid("playlist", format!("no entry at {pos}")))?;
        let basename = entry
            .filename
            .rsplit('/')
            .next()
            .unwrap_or(&entry.filename)
            .to_string();
        let title = entry.title.clone().unwrap_or_else(|| basename.clone());

        if let Err(e) = self.open_stream(&entry.filename) {
            self.insert("playlist-pos", PropertyValue::Int64(-1));
            self.emit(EventId::EndFile);
            return Err(e);
        }

        self.emit(EventId::StartFile);
        self.insert("playlist-pos", PropertyValue::Int64(pos as i64));
        self.insert("path", PropertyValue::String(entry.filename.clone()));
        self.insert("filename", PropertyValue::String(basename));
        self.insert("media-title", PropertyValue::String(title));
        self.insert("time-pos", PropertyValue::Double(0.0));
        self.emit(EventId::FileLoaded);
        Ok(())
    }

    /// Closes the current stream and, for `datasource://` URLs, opens the
    /// next one through the registered factory.
    fn open_stream(&mut self, url: &str) -> Result<()> {
        self.stream = None;
        if datasource::data_source_path(url).is_none() {
            self.remove("file-size");
            return Ok(());
        }

        let factory = self.data_sources.clone().ok_or_else(|| {
            EngineError::invalid(
                DATA_SOURCE_SCHEME,
                format!("no data source factory for '{url}'"),
            )
        })?;
        let mut source = factory.open(url).map_err(|e| EngineError::stream(url, e))?;
        // Streams start at offset 0; one that cannot seek there is unusable
        source.seek(0).map_err(|e| EngineError::stream(url, e))?;
        match source.size() {
            Ok(size) => self.insert("file-size", PropertyValue::Int64(size as i64)),
            Err(e) => {
                warn!("[Engine] Size of '{}' is unknown: {}", url, e);
                self.remove("file-size");
            }
        }
        self.stream = Some(OpenStream {
            url: url.to_string(),
            source,
        });
        Ok(())
    }

    // Track and chapter lists

    pub fn write_track_list(&mut self, tracks: &[TrackEntry]) {
        let old_count = self.get_int("track-list/count").unwrap_or(0);
        for i in 0..old_count.max(tracks.len() as i64) {
            for field in ["type", "id", "lang", "title"] {
                self.remove(&format!("track-list/{i}/{field}"));
            }
        }
        for (i, track) in tracks.iter().enumerate() {
            self.insert(
                &format!("track-list/{i}/type"),
                PropertyValue::String(track.kind.clone()),
            );
            self.insert(&format!("track-list/{i}/id"), PropertyValue::Int64(track.id));
            if let Some(lang) = &track.lang {
                self.insert(
                    &format!("track-list/{i}/lang"),
                    PropertyValue::String(lang.clone()),
                );
            }
            if let Some(title) = &track.title {
                self.insert(
                    &format!("track-list/{i}/title"),
                    PropertyValue::String(title.clone()),
                );
            }
        }
        self.insert("track-list/count", PropertyValue::Int64(tracks.len() as i64));
    }

    /// Ids of tracks of the given type, in track-list order.
    pub fn track_ids(&self, kind: &str) -> Vec<i64> {
        let count = self.get_int("track-list/count").unwrap_or(0);
        (0..count)
            .filter(|i| self.get_str(&format!("track-list/{i}/type")).as_deref() == Some(kind))
            .filter_map(|i| self.get_int(&format!("track-list/{i}/id")))
            .collect()
    }

    pub fn write_chapter_list(&mut self, chapters: &[ChapterEntry]) {
        let old_count = self.get_int("chapter-list/count").unwrap_or(0);
        for i in 0..old_count.max(chapters.len() as i64) {
            self.remove(&format!("chapter-list/{i}/title"));
            self.remove(&format!("chapter-list/{i}/time"));
        }
        for (i, chapter) in chapters.iter().enumerate() {
            if let Some(title) = &chapter.title {
                self.insert(
                    &format!("chapter-list/{i}/title"),
                    PropertyValue::String(title.clone()),
                );
            }
            self.insert(
                &format!("chapter-list/{i}/time"),
                PropertyValue::Double(chapter.time),
            );
        }
        self.insert(
            "chapter-list/count",
            PropertyValue::Int64(chapters.len() as i64),
        );
    }
}

struct Observation {
    name: String,
    format: Format,
    reply_id: u64,
}

impl Observation {
    /// Composite properties (`track-list`) fire when any sub-path changes.
    fn matches(&self, path: &str) -> bool {
        let base = self.name.strip_suffix("/full").unwrap_or(&self.name);
        path == base
            || path
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    fn notification(&self, state: &CoreState) -> EngineEvent {
        let value = state
            .get(&self.name)
            .and_then(|value| value.convert(self.format))
            .unwrap_or(PropertyValue::None);
        EngineEvent::PropertyChange(PropertyChange {
            name: self.name.clone(),
            reply_id: self.reply_id,
            value,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Destroyed,
}

/// State shared with the event thread.
#[derive(Default)]
struct Shared {
    observers: Mutex<Vec<Arc<dyn EventObserver>>>,
    stop: AtomicBool,
    overflowed: AtomicBool,
}

impl Shared {
    fn dispatch(&self, event: &EngineEvent) {
        // Snapshot so observers can add or remove observers while handling events
        let observers = lock(&self.observers).clone();
        for observer in observers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| match event {
                EngineEvent::PropertyChange(change) => observer.event_property(change),
                EngineEvent::Event(id) => observer.event(*id),
                EngineEvent::Log(message) => observer.log_message(message),
            }));
            if result.is_err() {
                error!("[Engine] Observer panicked while handling {:?}", event);
            }
        }
    }
}

fn run_event_loop(shared: Arc<Shared>, mut consumer: HeapCons<EngineEvent>) {
    loop {
        while let Some(event) = consumer.try_pop() {
            shared.dispatch(&event);
        }
        if shared.overflowed.swap(false, Ordering::AcqRel) {
            shared.dispatch(&EngineEvent::Event(EventId::QueueOverflow));
        }
        if shared.stop.load(Ordering::Acquire) {
            while let Some(event) = consumer.try_pop() {
                shared.dispatch(&event);
            }
            break;
        }
        thread::park();
    }
    debug!("[Engine] Event thread exited");
}

pub struct Core {
    state: Mutex<CoreState>,
    commands: Mutex<HashMap<String, Command>>,
    observations: Mutex<Vec<Observation>>,
    lifecycle: Mutex<Lifecycle>,
    producer: Mutex<HeapProd<EngineEvent>>,
    consumer: Mutex<Option<HeapCons<EngineEvent>>>,
    event_thread: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl Core {
    pub fn new() -> Self {
        let (producer, consumer) = HeapRb::<EngineEvent>::new(EVENT_QUEUE_CAPACITY).split();
        Self {
            state: Mutex::new(CoreState::default()),
            commands: Mutex::new(HashMap::new()),
            observations: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::Created),
            producer: Mutex::new(producer),
            consumer: Mutex::new(Some(consumer)),
            event_thread: Mutex::new(None),
            shared: Arc::new(Shared::default()),
        }
    }

    /// An engine with the standard property table and command set.
    pub fn with_defaults() -> Self {
        let core = Self::new();
        crate::property::register_property(&core);
        crate::commands::register_commands(&core);
        core
    }

    pub fn add_property(&self, name: &str, value: PropertyValue) {
        self.mutate(|state| state.insert(name, value));
    }

    /// Drops a property, as the engine does when a track or file goes away.
    pub fn remove_property(&self, name: &str) {
        self.mutate(|state| state.remove(name));
    }

    pub fn add_command(&self, name: &str, command: Command) {
        lock(&self.commands).insert(name.to_string(), command);
    }

    pub fn set_track_list(&self, tracks: &[TrackEntry]) {
        self.mutate(|state| state.write_track_list(tracks));
    }

    pub fn set_chapter_list(&self, chapters: &[ChapterEntry]) {
        self.mutate(|state| state.write_chapter_list(chapters));
    }

    pub fn set_playlist(&self, entries: &[PlaylistEntry]) {
        self.mutate(|state| state.write_playlist(entries));
    }

    pub fn option(&self, name: &str) -> Option<PropertyValue> {
        lock(&self.state).option(name).cloned()
    }

    /// Every command issued so far, including rejected ones.
    pub fn command_history(&self) -> Vec<Vec<String>> {
        lock(&self.state).history.clone()
    }

    pub fn clear_command_history(&self) {
        lock(&self.state).history.clear();
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.shared.observers).len()
    }

    /// Reads from the stream of the current `datasource://` file. `buf` is
    /// filled unless the stream ends first.
    pub fn read_stream(&self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_running()?;
        let mut state = lock(&self.state);
        let stream = state.stream.as_mut().ok_or(EngineError::NoStream)?;
        datasource::read_full(stream.source.as_mut(), buf)
            .map_err(|e| EngineError::stream(&stream.url, e))
    }

    pub fn seek_stream(&self, offset: u64) -> Result<()> {
        self.ensure_running()?;
        let mut state = lock(&self.state);
        let stream = state.stream.as_mut().ok_or(EngineError::NoStream)?;
        stream
            .source
            .seek(offset)
            .map_err(|e| EngineError::stream(&stream.url, e))
    }

    fn ensure_running(&self) -> Result<()> {
        match *lock(&self.lifecycle) {
            Lifecycle::Created => Err(EngineError::Uninitialized),
            Lifecycle::Running => Ok(()),
            Lifecycle::Destroyed => Err(EngineError::Destroyed),
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        match *lock(&self.lifecycle) {
            Lifecycle::Destroyed => Err(EngineError::Destroyed),
            _ => Ok(()),
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> R {
        let mut state = lock(&self.state);
        let result = f(&mut state);
        self.flush(state);
        result
    }

    /// Turns the changes recorded on `state` into queued events.
    fn flush(&self, mut state: MutexGuard<'_, CoreState>) {
        let changed = std::mem::take(&mut state.changed);
        let events = std::mem::take(&mut state.events);
        let logs = std::mem::take(&mut state.logs);

        let mut pending = Vec::new();
        if !changed.is_empty() {
            let observations = lock(&self.observations);
            for observation in observations.iter() {
                if changed.iter().any(|path| observation.matches(path)) {
                    pending.push(observation.notification(&state));
                }
            }
        }
        pending.extend(events.into_iter().map(EngineEvent::Event));
        pending.extend(logs.into_iter().map(EngineEvent::Log));
        // Queued before `state` is released, so notifications leave in the
        // same order as the writes behind them
        self.enqueue(pending);
    }

    fn enqueue(&self, events: Vec<EngineEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut producer = lock(&self.producer);
            for event in events {
                if producer.try_push(event).is_err()
                    && !self.shared.overflowed.swap(true, Ordering::AcqRel)
                {
                    warn!("[Engine] Event queue full, dropping events");
                }
            }
        }
        self.wake();
    }

    fn wake(&self) {
        if let Some(handle) = lock(&self.event_thread).as_ref() {
            handle.thread().unpark();
        }
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Core {
    fn init(&self) -> Result<()> {
        let mut lifecycle = lock(&self.lifecycle);
        match *lifecycle {
            Lifecycle::Running => return Err(EngineError::AlreadyInitialized),
            Lifecycle::Destroyed => return Err(EngineError::Destroyed),
            Lifecycle::Created => {}
        }

        let consumer = lock(&self.consumer)
            .take()
            .ok_or(EngineError::AlreadyInitialized)?;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("engine-event".to_string())
            .spawn(move || run_event_loop(shared, consumer))
            .map_err(|e| EngineError::EventThread(e.to_string()))?;

        *lock(&self.event_thread) = Some(handle);
        *lifecycle = Lifecycle::Running;
        info!("[Engine] Initialized");
        drop(lifecycle);

        // Anything queued before init is waiting
        self.wake();
        Ok(())
    }

    /// Called from an observer callback (the last `Arc<Core>` released on the
    /// event thread), this does not wait for the thread; the loop ends once
    /// the callback returns.
    fn destroy(&self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if *lifecycle == Lifecycle::Destroyed {
                return;
            }
            *lifecycle = Lifecycle::Destroyed;
        }

        self.enqueue(vec![EngineEvent::Event(EventId::Shutdown)]);
        self.shared.stop.store(true, Ordering::Release);

        let handle = lock(&self.event_thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("[Engine] Destroyed from the event thread, not joining");
            } else {
                handle.thread().unpark();
                if handle.join().is_err() {
                    error!("[Engine] Event thread panicked");
                }
            }
        }

        lock(&self.shared.observers).clear();
        lock(&self.observations).clear();
        lock(&self.state).stream = None;
        debug!("[Engine] Destroyed");
    }

    fn command(&self, args: &[&str]) -> Result<()> {
        self.ensure_running()?;
        if args.len() > MAX_COMMAND_ARGS {
            return Err(EngineError::TooManyArguments(args.len()));
        }
        let (name, params) = args
            .split_first()
            .ok_or_else(|| EngineError::invalid("command", "empty command"))?;
        let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();

        let execute = lock(&self.commands)
            .get(*name)
            .map(|cmd| Arc::clone(&cmd.execute));

        let mut state = lock(&self.state);
        state
            .history
            .push(args.iter().map(|s| s.to_string()).collect());
        let result = match execute {
            Some(exec_fn) => exec_fn(params.as_slice(), &mut *state),
            None => Err(EngineError::UnknownCommand(name.to_string())),
        };
        if let Err(e) = &result {
            state.log(LogLevel::Error, format!("Command '{name}' failed: {e}"));
        }
        self.flush(state);
        result
    }

    fn set_option(&self, name: &str, value: PropertyValue) -> Result<()> {
        self.ensure_alive()?;
        let mut state = lock(&self.state);
        state.options.insert(name.to_string(), value.clone());
        // Options double as the initial value of the property of the same name
        if state.contains(name) {
            state.set(name, value)?;
        }
        self.flush(state);
        Ok(())
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<()> {
        self.ensure_running()?;
        let mut state = lock(&self.state);
        let result = state.set(name, value);
        self.flush(state);
        result
    }

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue> {
        self.ensure_running()?;
        let state = lock(&self.state);
        let value = state
            .get(name)
            .ok_or_else(|| EngineError::PropertyUnavailable(name.to_string()))?;
        value.convert(format).ok_or_else(|| EngineError::FormatMismatch {
            name: name.to_string(),
            format,
        })
    }

    fn observe_property(&self, name: &str, format: Format, reply_id: u64) -> Result<()> {
        self.ensure_alive()?;
        let observation = Observation {
            name: name.to_string(),
            format,
            reply_id,
        };
        // The current value is always delivered once after registering. The
        // state lock is held throughout so no write lands between the
        // snapshot and the registration.
        let state = lock(&self.state);
        let initial = observation.notification(&state);
        lock(&self.observations).push(observation);
        self.enqueue(vec![initial]);
        drop(state);
        Ok(())
    }

    fn unobserve_property(&self, reply_id: u64) -> Result<usize> {
        self.ensure_alive()?;
        let mut observations = lock(&self.observations);
        let before = observations.len();
        observations.retain(|o| o.reply_id != reply_id);
        Ok(before - observations.len())
    }

    fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        lock(&self.shared.observers).push(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn EventObserver>) {
        lock(&self.shared.observers).retain(|o| !Arc::ptr_eq(o, observer));
    }

    fn set_data_source_factory(&self, factory: Arc<dyn DataSourceFactory>) {
        lock(&self.state).data_sources = Some(factory);
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.destroy();
    }
}
