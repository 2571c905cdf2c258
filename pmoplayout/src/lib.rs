//! # pmoplayout - Moteur de playout pour la diffusion en direct
//!
//! Cette crate pilote le déroulé d'un conducteur à l'antenne :
//! - Cache transactionnel par playlist, commité ou abandonné d'un bloc
//! - Verrous par playlist, servis par priorité d'opération
//! - Take, hold, ad-libs, rappels de lecture des périphériques
//! - Génération déterministe du timeline (groupes de parts, infinis, lookahead)
//! - Persistance dans un magasin de documents (mémoire ou SQLite)
//!
//! # Architecture
//!
//! - **PlayoutContext** : magasin, verrous, blueprint et réglages partagés
//! - **CacheForPlayout** : vue en écriture d'un playlist pendant une opération
//! - **StudioWorkerSet** : trois files de travaux par studio
//! - **Blueprint** : personnalisation du timeline par l'émission
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use pmoplayout::{
//!     DefaultBlueprint, MemoryStore, PlayoutContext, PlayoutOptions, activate_rundown_playlist,
//!     take_next_part,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> pmoplayout::Result<()> {
//! let ctx = PlayoutContext::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(DefaultBlueprint),
//!     PlayoutOptions::default(),
//! );
//!
//! activate_rundown_playlist(&ctx, "playlist0", false).await?;
//! take_next_part(&ctx, "playlist0").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod error;
pub mod lock;
pub mod model;
pub mod playout;
pub mod rank;
pub mod store;
pub mod timeline;
mod worker;

#[cfg(feature = "pmoconfig")]
mod config_ext;

// Réexports publics
pub use error::{Error, Result};
pub use lock::{OperationPriority, PlaylistLock, PlaylistLockManager};
pub use playout::{
    AdLibPart, IngestPart, PlayoutContext, PlayoutOptions, activate_hold, activate_rundown_playlist,
    deactivate_hold, deactivate_rundown_playlist, insert_parts, move_parts, on_part_playback_started,
    on_piece_playback_started, queue_adlib_part, remove_rundown_playlist, replace_part, set_next_part,
    stop_pieces_on_source_layers, swap_parts, take_next_part, update_part_ranks,
    update_studio_baseline_operation,
};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
pub use timeline::{Blueprint, DefaultBlueprint, StudioClock};
pub use worker::{StudioWorkerSet, WorkQueue, WorkerManager};

#[cfg(feature = "pmoconfig")]
pub use config_ext::PlayoutConfigExt;

/// Heure courante en millisecondes depuis l'époque Unix
pub fn get_current_time() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
