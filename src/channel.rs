//! Fire-and-forget access to the engine.
//!
//! Engine-side rejections have no return path to the UI: reads that fail come
//! back as `None`, failed writes and commands are logged and dropped.

use crate::datasource::DataSourceFactory;
use crate::engine::{Engine, EventObserver, Format, PropertyValue};
use std::sync::Arc;
use tracing::*;

#[derive(Clone)]
pub struct CommandChannel {
    engine: Arc<dyn Engine>,
}

impl CommandChannel {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Sends a command. Commands are applied in issue order; their effects
    /// show up later as property notifications.
    pub fn command(&self, args: &[&str]) {
        if let Err(e) = self.engine.command(args) {
            error!(
                "[Channel] Command [{}] failed: {}",
                args.first().copied().unwrap_or(""),
                e
            );
        }
    }

    // Options

    pub fn set_option_string(&self, name: &str, value: &str) {
        if let Err(e) = self.engine.set_option_string(name, value) {
            error!("[Channel] set_option_string({}) failed: {}", name, e);
        }
    }

    pub fn set_option_int(&self, name: &str, value: i64) {
        if let Err(e) = self.engine.set_option_int(name, value) {
            error!("[Channel] set_option_int({}) failed: {}", name, e);
        }
    }

    pub fn set_option_double(&self, name: &str, value: f64) {
        if let Err(e) = self.engine.set_option_double(name, value) {
            error!("[Channel] set_option_double({}) failed: {}", name, e);
        }
    }

    pub fn set_option_flag(&self, name: &str, value: bool) {
        if let Err(e) = self.engine.set_option_flag(name, value) {
            error!("[Channel] set_option_flag({}) failed: {}", name, e);
        }
    }

    // Properties

    fn set_property(&self, name: &str, value: PropertyValue) {
        let format = value.format();
        if let Err(e) = self.engine.set_property(name, value) {
            error!("[Channel] set_property({}) format {:?} failed: {}", name, format, e);
        }
    }

    pub fn set_property_string(&self, name: &str, value: &str) {
        self.set_property(name, PropertyValue::String(value.to_string()));
    }

    pub fn set_property_int(&self, name: &str, value: i64) {
        self.set_property(name, PropertyValue::Int64(value));
    }

    pub fn set_property_double(&self, name: &str, value: f64) {
        self.set_property(name, PropertyValue::Double(value));
    }

    pub fn set_property_flag(&self, name: &str, value: bool) {
        self.set_property(name, PropertyValue::Flag(value));
    }

    fn get_property(&self, name: &str, format: Format) -> Option<PropertyValue> {
        match self.engine.get_property(name, format) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("[Channel] get_property({}) format {:?} failed: {}", name, format, e);
                None
            }
        }
    }

    pub fn get_property_string(&self, name: &str) -> Option<String> {
        self.get_property(name, Format::String)?.into_string()
    }

    pub fn get_property_int(&self, name: &str) -> Option<i64> {
        self.get_property(name, Format::Int64)?.as_int()
    }

    pub fn get_property_double(&self, name: &str) -> Option<f64> {
        self.get_property(name, Format::Double)?.as_double()
    }

    pub fn get_property_flag(&self, name: &str) -> Option<bool> {
        self.get_property(name, Format::Flag)?.as_flag()
    }

    // Observation

    pub fn observe_property(&self, name: &str, format: Format, reply_id: u64) -> bool {
        match self.engine.observe_property(name, format, reply_id) {
            Ok(()) => true,
            Err(e) => {
                error!("[Channel] observe_property({}) format {:?} failed: {}", name, format, e);
                false
            }
        }
    }

    pub fn unobserve_property(&self, reply_id: u64) {
        match self.engine.unobserve_property(reply_id) {
            Ok(0) => debug!("[Channel] unobserve_property({}) had no effect", reply_id),
            Ok(_) => {}
            Err(e) => debug!("[Channel] unobserve_property({}) failed: {}", reply_id, e),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        self.engine.add_observer(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn EventObserver>) {
        self.engine.remove_observer(observer);
    }

    pub fn set_data_source_factory(&self, factory: Arc<dyn DataSourceFactory>) {
        self.engine.set_data_source_factory(factory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Core;

    fn channel() -> (Arc<Core>, CommandChannel) {
        let core = Arc::new(Core::with_defaults());
        core.init().unwrap();
        let channel = CommandChannel::new(core.clone());
        (core, channel)
    }

    #[test]
    fn test_failed_reads_are_absent() {
        let (_core, channel) = channel();
        assert_eq!(channel.get_property_double("time-pos"), None);
        assert_eq!(channel.get_property_string("no-such-property"), None);
        assert_eq!(channel.get_property_int("aid"), None);
        assert_eq!(channel.get_property_string("aid"), Some("no".to_string()));
    }

    #[test]
    fn test_failed_writes_are_swallowed() {
        let (core, channel) = channel();
        channel.set_property_string("speed", "fast");
        channel.command(&["no-such-command"]);
        channel.set_property_flag("no-such-property", true);

        assert_eq!(channel.get_property_double("speed"), Some(1.0));
        assert_eq!(core.command_history(), vec![vec!["no-such-command".to_string()]]);
    }

    #[test]
    fn test_typed_writes() {
        let (_core, channel) = channel();
        channel.set_property_double("speed", 1.75);
        channel.set_property_int("aid", 2);
        channel.set_property_flag("pause", true);

        assert_eq!(channel.get_property_double("speed"), Some(1.75));
        assert_eq!(channel.get_property_int("aid"), Some(2));
        assert_eq!(channel.get_property_flag("pause"), Some(true));
    }

    #[test]
    fn test_options_before_init() {
        let core = Arc::new(Core::with_defaults());
        let channel = CommandChannel::new(core.clone());
        channel.set_option_string("profile", "fast");
        channel.set_option_int("demuxer-max-bytes", 64 * 1024 * 1024);
        channel.set_option_string("vo", "gpu-next");

        assert_eq!(
            core.option("profile"),
            Some(PropertyValue::String("fast".to_string()))
        );
        assert_eq!(
            core.option("demuxer-max-bytes"),
            Some(PropertyValue::Int64(64 * 1024 * 1024))
        );
        core.init().unwrap();
        assert_eq!(channel.get_property_string("vo"), Some("gpu-next".to_string()));
    }
}
