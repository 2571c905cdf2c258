//! Opérations de playout et d'ingest
//!
//! Chaque opération suit le même cycle : verrou du playlist (par priorité),
//! chargement du cache, logique métier synchrone, puis commit si elle
//! réussit ou abandon de toutes les écritures si elle échoue. Le verrou est
//! relâché avant que le résultat ne soit rendu à l'appelant.

mod activation;
mod adlib;
mod callbacks;
mod ingest;
mod instances;
mod selection;
mod take;

pub use activation::{activate_rundown_playlist, deactivate_rundown_playlist, remove_rundown_playlist};
pub use adlib::{AdLibPart, queue_adlib_part, stop_pieces_on_source_layers};
pub use callbacks::{on_part_playback_started, on_piece_playback_started};
pub use ingest::{IngestPart, insert_parts, move_parts, replace_part, swap_parts, update_part_ranks};
pub use instances::set_next_part;
pub use selection::{SelectedNextPart, ordered_parts, select_next_part};
pub use take::{activate_hold, deactivate_hold, take_next_part};

use crate::cache::{Cache, CacheForPlayout, CacheForStudio, CacheOptions};
use crate::lock::{OperationPriority, PlaylistLock, PlaylistLockManager};
use crate::store::DocumentStore;
use crate::timeline::{Blueprint, StudioClock, update_studio_baseline, update_timeline};
use crate::Result;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayoutOptions {
    pub cache: CacheOptions,
    pub clock: StudioClock,
}

/// Dépendances partagées par toutes les opérations
#[derive(Clone)]
pub struct PlayoutContext {
    store: Arc<dyn DocumentStore>,
    locks: PlaylistLockManager,
    blueprint: Arc<dyn Blueprint>,
    options: PlayoutOptions,
}

pub(crate) fn studio_lock_key(studio_id: &str) -> String {
    format!("studio:{}", studio_id)
}

impl PlayoutContext {
    pub fn new(store: Arc<dyn DocumentStore>, blueprint: Arc<dyn Blueprint>, options: PlayoutOptions) -> Self {
        Self {
            store,
            locks: PlaylistLockManager::new(),
            blueprint,
            options,
        }
    }

    /// Partage un gestionnaire de verrous existant
    pub fn with_locks(mut self, locks: PlaylistLockManager) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn locks(&self) -> &PlaylistLockManager {
        &self.locks
    }

    pub fn blueprint(&self) -> &dyn Blueprint {
        self.blueprint.as_ref()
    }

    pub fn options(&self) -> &PlayoutOptions {
        &self.options
    }

    /// Régénère le timeline du studio du playlist en cache
    pub fn update_timeline(&self, cache: &mut CacheForPlayout, force_now_to_time: Option<i64>) -> Result<()> {
        update_timeline(cache, self.blueprint(), &self.options.clock, force_now_to_time)
    }

    pub async fn lock_studio(&self, studio_id: &str, priority: OperationPriority) -> Result<PlaylistLock> {
        self.locks.lock(&studio_lock_key(studio_id), priority).await
    }

    /// Exécute `f` dans la section critique du playlist
    ///
    /// Le cache est commité si `f` réussit ; sinon toutes ses écritures sont
    /// abandonnées et l'erreur est propagée.
    pub async fn run_playout_operation<T, F>(
        &self,
        playlist_id: &str,
        priority: OperationPriority,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut CacheForPlayout, &PlayoutContext) -> Result<T> + Send,
        T: Send,
    {
        let span = info_span!("playout_operation", playlist_id, %priority);
        async move {
            let _lock = self.locks.lock(playlist_id, priority).await?;
            let mut cache =
                CacheForPlayout::create(self.store.clone(), playlist_id, self.options.cache.clone()).await?;

            match f(&mut cache, self) {
                Ok(value) => {
                    if let Err(e) = cache.save_all_to_database().await {
                        error!("Commit failed: {}", e);
                        return Err(e);
                    }
                    Ok(value)
                }
                Err(e) => {
                    warn!("Operation failed, changes discarded: {}", e);
                    cache.discard_changes();
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Variante de [`Self::run_playout_operation`] sur le cache réduit d'un studio
    pub async fn run_studio_operation<T, F>(
        &self,
        studio_id: &str,
        priority: OperationPriority,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut CacheForStudio, &PlayoutContext) -> Result<T> + Send,
        T: Send,
    {
        let span = info_span!("studio_operation", studio_id, %priority);
        async move {
            let _lock = self.lock_studio(studio_id, priority).await?;
            let mut cache = CacheForStudio::create(self.store.clone(), studio_id, self.options.cache.clone()).await?;

            match f(&mut cache, self) {
                Ok(value) => {
                    if let Err(e) = cache.save_all_to_database().await {
                        error!("Commit failed: {}", e);
                        return Err(e);
                    }
                    Ok(value)
                }
                Err(e) => {
                    warn!("Operation failed, changes discarded: {}", e);
                    cache.discard_changes();
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Régénère la base d'un studio sans playlist actif
pub async fn update_studio_baseline_operation(ctx: &PlayoutContext, studio_id: &str) -> Result<bool> {
    let updated = ctx
        .run_studio_operation(studio_id, OperationPriority::Maintenance, |cache, ctx| {
            update_studio_baseline(cache, ctx.blueprint(), &ctx.options().clock)
        })
        .await?;
    if updated {
        info!(studio_id, "Studio baseline updated");
    }
    Ok(updated)
}
