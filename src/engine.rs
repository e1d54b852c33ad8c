//! Boundary to the native playback engine.
//!
//! Everything the adapter knows about the engine goes through the [`Engine`]
//! trait: raw option/property access keyed by path, fire-and-forget commands,
//! and property observation with asynchronous delivery to [`EventObserver`]s.

use crate::datasource::DataSourceFactory;
use crate::error::EngineError;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Declared representation of a property value on the wire.
///
/// `None` and `Node` observations carry no usable payload; the receiver
/// re-queries whatever typed values it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    None,
    String,
    Int64,
    Double,
    Flag,
    Node,
}

impl Format {
    /// Whether notifications in this format carry a value.
    pub fn carries_value(self) -> bool {
        !matches!(self, Format::None | Format::Node)
    }
}

// Property value types
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    None,
    String(String),
    Int64(i64),
    Double(f64),
    Flag(bool),
}

impl PropertyValue {
    pub fn format(&self) -> Format {
        match self {
            PropertyValue::None => Format::None,
            PropertyValue::String(_) => Format::String,
            PropertyValue::Int64(_) => Format::Int64,
            PropertyValue::Double(_) => Format::Double,
            PropertyValue::Flag(_) => Format::Flag,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to another wire format the way the engine does when a
    /// property is read or observed with a format other than its native one.
    ///
    /// Returns `None` when no lossless conversion exists.
    pub fn convert(&self, format: Format) -> Option<PropertyValue> {
        if !format.carries_value() {
            return Some(PropertyValue::None);
        }
        let converted = match (self, format) {
            (PropertyValue::None, _) => return None,
            (v, f) if v.format() == f => v.clone(),

            (PropertyValue::Int64(i), Format::String) => PropertyValue::String(i.to_string()),
            (PropertyValue::Double(d), Format::String) => PropertyValue::String(format!("{d:.6}")),
            (PropertyValue::Flag(b), Format::String) => {
                PropertyValue::String(if *b { "yes" } else { "no" }.to_string())
            }

            (PropertyValue::Double(d), Format::Int64) => {
                if d.is_finite() && d.fract() == 0.0 {
                    PropertyValue::Int64(*d as i64)
                } else {
                    return None;
                }
            }
            (PropertyValue::String(s), Format::Int64) => PropertyValue::Int64(s.trim().parse().ok()?),

            (PropertyValue::Int64(i), Format::Double) => PropertyValue::Double(*i as f64),
            (PropertyValue::String(s), Format::Double) => PropertyValue::Double(s.trim().parse().ok()?),

            (PropertyValue::String(s), Format::Flag) => match s.as_str() {
                "yes" => PropertyValue::Flag(true),
                "no" => PropertyValue::Flag(false),
                _ => return None,
            },

            _ => return None,
        };
        Some(converted)
    }
}

/// Engine lifecycle and playback events other than property changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventId {
    Shutdown,
    StartFile,
    EndFile,
    FileLoaded,
    VideoReconfig,
    AudioReconfig,
    Seek,
    PlaybackRestart,
    QueueOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub prefix: String,
    pub level: LogLevel,
    pub text: String,
}

/// A property change as delivered by the engine, already converted to the
/// format it was observed with.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub reply_id: u64,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PropertyChange(PropertyChange),
    Event(EventId),
    Log(LogMessage),
}

/// Receiver of asynchronous engine events.
///
/// Called from the engine's event thread, never from the thread that issued
/// the command or property write that caused the event.
pub trait EventObserver: Send + Sync {
    fn event_property(&self, change: &PropertyChange);

    fn event(&self, _id: EventId) {}

    fn log_message(&self, _message: &LogMessage) {}
}

pub trait Engine: Send + Sync {
    fn init(&self) -> Result<()>;

    /// Stops event delivery and releases the handle. No observer is invoked
    /// once this returns.
    fn destroy(&self);

    fn command(&self, args: &[&str]) -> Result<()>;

    fn set_option(&self, name: &str, value: PropertyValue) -> Result<()>;

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<()>;

    fn get_property(&self, name: &str, format: Format) -> Result<PropertyValue>;

    fn observe_property(&self, name: &str, format: Format, reply_id: u64) -> Result<()>;

    /// Returns how many registrations were removed.
    fn unobserve_property(&self, reply_id: u64) -> Result<usize>;

    fn add_observer(&self, observer: Arc<dyn EventObserver>);

    fn remove_observer(&self, observer: &Arc<dyn EventObserver>);

    /// Opens every `datasource://` URL the engine loads from now on.
    fn set_data_source_factory(&self, factory: Arc<dyn DataSourceFactory>);

    // Typed conveniences

    fn set_option_string(&self, name: &str, value: &str) -> Result<()> {
        self.set_option(name, PropertyValue::String(value.to_string()))
    }

    fn set_option_int(&self, name: &str, value: i64) -> Result<()> {
        self.set_option(name, PropertyValue::Int64(value))
    }

    fn set_option_double(&self, name: &str, value: f64) -> Result<()> {
        self.set_option(name, PropertyValue::Double(value))
    }

    fn set_option_flag(&self, name: &str, value: bool) -> Result<()> {
        self.set_option(name, PropertyValue::Flag(value))
    }

    fn get_property_string(&self, name: &str) -> Result<String> {
        match self.get_property(name, Format::String)? {
            PropertyValue::String(s) => Ok(s),
            _ => Err(mismatch(name, Format::String)),
        }
    }

    fn get_property_int(&self, name: &str) -> Result<i64> {
        self.get_property(name, Format::Int64)?
            .as_int()
            .ok_or_else(|| mismatch(name, Format::Int64))
    }

    fn get_property_double(&self, name: &str) -> Result<f64> {
        self.get_property(name, Format::Double)?
            .as_double()
            .ok_or_else(|| mismatch(name, Format::Double))
    }

    fn get_property_flag(&self, name: &str) -> Result<bool> {
        self.get_property(name, Format::Flag)?
            .as_flag()
            .ok_or_else(|| mismatch(name, Format::Flag))
    }
}

fn mismatch(name: &str, format: Format) -> EngineError {
    EngineError::FormatMismatch {
        name: name.to_string(),
        format,
    }
}
