//! Extension de pmoconfig pour le moteur de playout

use crate::cache::CacheOptions;
use crate::timeline::StudioClock;
use std::path::PathBuf;
use std::time::Duration;

/// Trait d'extension pour pmoconfig::Config
pub trait PlayoutConfigExt {
    /// Options des caches (pause après le timeline, mode production)
    fn cache_options(&self) -> anyhow::Result<CacheOptions>;

    /// Réglages d'horloge appliqués au timeline des studios
    fn studio_clock(&self) -> anyhow::Result<StudioClock>;

    /// Capacité de chaque file de travaux d'un studio
    fn worker_queue_capacity(&self) -> anyhow::Result<usize>;

    /// Chemin de la base de données du playout
    fn playout_db_path(&self) -> anyhow::Result<PathBuf>;
}

impl PlayoutConfigExt for pmoconfig::Config {
    fn cache_options(&self) -> anyhow::Result<CacheOptions> {
        Ok(CacheOptions {
            timeline_flush_delay: Duration::from_millis(self.get_timeline_flush_delay_ms()?),
            production: self.get_cache_production()?,
        })
    }

    fn studio_clock(&self) -> anyhow::Result<StudioClock> {
        Ok(StudioClock {
            force_now_time: self.get_force_now_time()?,
            now_safe_latency_ms: i64::try_from(self.get_now_safe_latency_ms()?)?,
        })
    }

    fn worker_queue_capacity(&self) -> anyhow::Result<usize> {
        Ok(self.get_worker_queue_capacity()?.max(1))
    }

    fn playout_db_path(&self) -> anyhow::Result<PathBuf> {
        // get_managed_dir crée le répertoire s'il n'existe pas
        let dir = self.get_managed_dir(&["playout", "storage", "directory"], "data")?;
        Ok(PathBuf::from(dir).join("playout.db"))
    }
}
