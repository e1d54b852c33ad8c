use mlua::{FromLua, Lua, Result, Table, Value};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub enum ConfigValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl ConfigValue {
    /// Textual form as the engine option parser expects it.
    pub fn to_text(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Number(n) => n.to_string(),
            ConfigValue::Bool(true) => "yes".to_string(),
            ConfigValue::Bool(false) => "no".to_string(),
        }
    }
}

#[derive(Clone, Default)]
pub struct Config {
    pub values: HashMap<String, ConfigValue>,
    lua: Option<Lua>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_lua_file(path: impl AsRef<Path>) -> Result<Self> {
        let script = std::fs::read_to_string(path).map_err(mlua::Error::external)?;
        Self::load_from_str(&script)
    }

    /// Runs `script` and collects the scalar entries of its global `config` table.
    pub fn load_from_str(script: &str) -> Result<Self> {
        let lua = Lua::new();
        lua.load(script).exec()?;

        let config_table: Table = lua.globals().get("config")?;
        let mut config = Config::new();

        for pair in config_table.pairs::<String, Value>() {
            let (key, value) = pair?;
            let config_value = match value {
                Value::String(s) => ConfigValue::String(s.to_str()?.to_string()),
                Value::Number(n) => ConfigValue::Number(n),
                Value::Integer(n) => ConfigValue::Number(n as f64),
                Value::Boolean(b) => ConfigValue::Bool(b),
                _ => continue,
            };
            config.values.insert(key, config_value);
        }

        config.lua = Some(lua);
        Ok(config)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            ConfigValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Any scalar value, rendered as text. Blank strings count as unset.
    pub fn get_text(&self, key: &str) -> Option<String> {
        Some(self.values.get(key)?.to_text()).filter(|s| !s.trim().is_empty())
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn get_nested<T: FromLua>(&self, table: &str, key: &str) -> Option<T> {
        let lua = self.lua.as_ref()?;
        let config: Table = lua.globals().get("config").ok()?;
        let nested: Table = config.get(table).ok()?;
        nested.get::<T>(key).ok()
    }

    pub fn get_nested_usize(&self, table: &str, key: &str) -> Option<usize> {
        self.get_nested(table, key)
    }
}

/// Config keys copied verbatim to the engine option of the same meaning.
pub const PASSTHROUGH_OPTIONS: &[(&str, &str)] = &[
    ("default_audio_language", "alang"),
    ("default_subtitle_language", "slang"),
    ("video_scale", "scale"),
    ("video_scale_param1", "scale-param1"),
    ("video_scale_param2", "scale-param2"),
    ("video_downscale", "dscale"),
    ("video_downscale_param1", "dscale-param1"),
    ("video_downscale_param2", "dscale-param2"),
    ("video_tscale", "tscale"),
    ("video_tscale_param1", "tscale-param1"),
    ("video_tscale_param2", "tscale-param2"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debanding {
    /// Software filter with the radius lowered from 16 for speed.
    Gradfun,
    Gpu,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    pub gpu_next: bool,
    pub hardware_decoding: bool,
    pub display_fps: Option<f64>,
    /// `(engine option, value)` pairs from [`PASSTHROUGH_OPTIONS`].
    pub passthrough: Vec<(String, String)>,
    pub debanding: Option<Debanding>,
    pub video_sync: String,
    pub interpolation: bool,
    pub gpu_debug: bool,
    pub fast_decode: bool,
    pub demuxer_cache_megs: u64,
    pub screenshot_dir: Option<String>,
    pub tls_ca_file: Option<String>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            gpu_next: false,
            hardware_decoding: true,
            display_fps: None,
            passthrough: Vec::new(),
            debanding: None,
            video_sync: "audio".to_string(),
            interpolation: false,
            gpu_debug: false,
            fast_decode: false,
            demuxer_cache_megs: 64,
            screenshot_dir: None,
            tls_ca_file: None,
        }
    }
}

impl PlayerOptions {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();

        let passthrough = PASSTHROUGH_OPTIONS
            .iter()
            .filter_map(|(key, option)| Some((option.to_string(), config.get_text(key)?)))
            .collect();

        let debanding = match config.get_string("video_debanding").as_deref() {
            Some("gradfun") => Some(Debanding::Gradfun),
            Some("gpu") => Some(Debanding::Gpu),
            _ => None,
        };

        Self {
            gpu_next: config.get_bool("gpu_next").unwrap_or(defaults.gpu_next),
            hardware_decoding: config
                .get_bool("hardware_decoding")
                .unwrap_or(defaults.hardware_decoding),
            display_fps: config.get_number("display_fps").filter(|fps| *fps > 0.0),
            passthrough,
            debanding,
            video_sync: config.get_text("video_sync").unwrap_or(defaults.video_sync),
            interpolation: config.get_bool("video_interpolation").unwrap_or(false),
            gpu_debug: config.get_bool("gpu_debug").unwrap_or(false),
            fast_decode: config.get_bool("video_fastdecode").unwrap_or(false),
            demuxer_cache_megs: config
                .get_nested_usize("cache", "megs")
                .map(|megs| megs as u64)
                .unwrap_or(defaults.demuxer_cache_megs),
            screenshot_dir: config.get_text("screenshot_dir"),
            tls_ca_file: config.get_text("tls_ca_file"),
        }
    }

    pub fn vo(&self) -> &'static str {
        if self.gpu_next { "gpu-next" } else { "gpu" }
    }

    pub fn hwdec(&self) -> &'static str {
        if self.hardware_decoding { "auto" } else { "no" }
    }

    pub fn demuxer_cache_bytes(&self) -> u64 {
        self.demuxer_cache_megs * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config() {
        let options = PlayerOptions::from_config(&Config::new());
        assert_eq!(options, PlayerOptions::default());
        assert_eq!(options.vo(), "gpu");
        assert_eq!(options.hwdec(), "auto");
        assert_eq!(options.demuxer_cache_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_options_from_lua() {
        let config = Config::load_from_str(
            r#"
            config = {
                gpu_next = true,
                hardware_decoding = false,
                display_fps = 60,
                default_audio_language = "jpn",
                default_subtitle_language = "",
                video_scale = "ewa_lanczossharp",
                video_scale_param1 = 0.5,
                video_debanding = "gradfun",
                video_sync = "display-resample",
                video_fastdecode = true,
                cache = { megs = 32 },
            }
            "#,
        )
        .unwrap();
        let options = PlayerOptions::from_config(&config);

        assert_eq!(options.vo(), "gpu-next");
        assert_eq!(options.hwdec(), "no");
        assert_eq!(options.display_fps, Some(60.0));
        assert_eq!(options.debanding, Some(Debanding::Gradfun));
        assert_eq!(options.video_sync, "display-resample");
        assert!(options.fast_decode);
        assert_eq!(options.demuxer_cache_megs, 32);
        assert_eq!(
            options.passthrough,
            vec![
                ("alang".to_string(), "jpn".to_string()),
                ("scale".to_string(), "ewa_lanczossharp".to_string()),
                ("scale-param1".to_string(), "0.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_config_table_is_an_error() {
        assert!(Config::load_from_str("settings = {}").is_err());
        assert!(Config::load_from_lua_file("/nonexistent/config.lua").is_err());
    }
}
