use mpvview::config::{Config, PlayerOptions};
use mpvview::core::Core;
use mpvview::lua::{init_lua, run_script};
use mpvview::repl::Repl;
use mpvview::view::PlayerView;
use std::sync::Arc;
use tracing::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_level = if cfg!(debug_assertions) {
        Level::TRACE
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(logging_level)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = match Config::load_from_lua_file("config.lua") {
        Ok(cfg) => {
            info!("[Config] Loaded config.lua");
            cfg
        }
        Err(e) => {
            warn!("[Config] Using default configuration: {}", e);
            Config::new()
        }
    };
    let options = PlayerOptions::from_config(&config);

    let config_dir = config.get_string("config_dir").unwrap_or_else(|| ".".to_string());
    let cache_dir = config
        .get_string("cache_dir")
        .unwrap_or_else(|| std::env::temp_dir().display().to_string());

    let core = Arc::new(Core::with_defaults());
    let view = Arc::new(PlayerView::new(core));
    view.initialize(&config_dir, &cache_dir, &options)?;

    let lua = init_lua(Arc::clone(&view))?;
    if let Some(script) = config.get_string("startup_script") {
        if let Err(e) = run_script(&lua, &script) {
            warn!("[Lua] Startup script failed: {}", e);
        }
    }

    // The REPL stands in for a real surface
    view.surface_created();

    println!("\nInitialization complete!\n");

    let mut repl = Repl::new(Arc::clone(&view), lua);
    let result = repl.run();

    view.surface_destroyed();
    view.destroy();
    result?;

    Ok(())
}
