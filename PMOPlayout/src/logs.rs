//! Initialisation du logging

use pmoconfig::get_config;
use tracing::Level;
use tracing_subscriber::{Registry, filter::LevelFilter, prelude::*, reload};

/// Handle permettant de changer le niveau de log à chaud
pub type LevelHandle = reload::Handle<LevelFilter, Registry>;

fn string_to_level(level: &str) -> Option<Level> {
    match level.to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Installe le subscriber global : filtre rechargeable puis sortie console
///
/// Le niveau minimum et l'activation de la console viennent de
/// `host.logger.min_level` et `host.logger.enable_console`.
pub fn init_logging() -> LevelHandle {
    let config = get_config();

    let log_level = match config.get_log_min_level() {
        Ok(l) => string_to_level(&l).map(LevelFilter::from_level).unwrap_or(LevelFilter::INFO),
        Err(_) => LevelFilter::INFO,
    };
    let (filter, reload_handle) = reload::Layer::new(log_level);
    let subscriber = Registry::default().with(filter);

    let enable_console = config.get_log_enable_console().unwrap_or(true);
    if enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }

    reload_handle
}
