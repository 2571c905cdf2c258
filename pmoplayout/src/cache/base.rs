//! Socle commun des caches : travail différé et commit priorisé

use super::collection::{Changes, DbCacheWritable};
use crate::store::DocumentStore;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, try_join_all};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Fonction exécutée juste avant le commit, avec le cache encore disponible
pub type DeferredFn<C> = Box<dyn FnOnce(&mut C) -> Result<()> + Send>;

/// Effet de bord lancé après un commit réussi
pub type AfterSaveFn = BoxFuture<'static, Result<()>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Pause après l'écriture d'un timeline modifié
    pub timeline_flush_delay: Duration,
    /// En production, `assert_no_changes` journalise au lieu d'échouer
    pub production: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            timeline_flush_delay: Duration::from_millis(2),
            production: !cfg!(debug_assertions),
        }
    }
}

/// État partagé par tous les caches
pub struct CacheCore<C> {
    store: Arc<dyn DocumentStore>,
    options: CacheOptions,
    deferred: Vec<DeferredFn<C>>,
    deferred_after_save: Vec<AfterSaveFn>,
}

impl<C> CacheCore<C> {
    pub fn new(store: Arc<dyn DocumentStore>, options: CacheOptions) -> Self {
        Self {
            store,
            options,
            deferred: Vec::new(),
            deferred_after_save: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub(crate) fn clear_deferred(&mut self) {
        self.deferred.clear();
        self.deferred_after_save.clear();
    }
}

/// Cache possédé par une seule opération
///
/// Rien n'est visible des autres opérations avant
/// [`Cache::save_all_to_database`].
#[async_trait]
pub trait Cache: Send + Sized + 'static {
    fn core(&self) -> &CacheCore<Self>;

    fn core_mut(&mut self) -> &mut CacheCore<Self>;

    fn collections(&self) -> Vec<&dyn DbCacheWritable>;

    fn collections_mut(&mut self) -> Vec<&mut dyn DbCacheWritable>;

    fn defer(&mut self, f: impl FnOnce(&mut Self) -> Result<()> + Send + 'static) {
        self.core_mut().deferred.push(Box::new(f));
    }

    fn defer_after_save(&mut self, f: impl Future<Output = Result<()>> + Send + 'static) {
        self.core_mut().deferred_after_save.push(Box::pin(f));
    }

    async fn save_all_to_database(&mut self) -> Result<()> {
        save_all(self).await
    }

    fn discard_changes(&mut self) {
        for collection in self.collections_mut() {
            collection.discard_changes();
        }
        self.core_mut().clear_deferred();
    }

    /// Garde pour les chemins déclarés sans effet de bord
    fn assert_no_changes(&self) -> Result<()> {
        let core = self.core();
        let mut problems = Vec::new();
        if !core.deferred.is_empty() {
            problems.push(format!("{} deferred functions", core.deferred.len()));
        }
        if !core.deferred_after_save.is_empty() {
            problems.push(format!(
                "{} after-save functions",
                core.deferred_after_save.len()
            ));
        }
        for collection in self.collections() {
            if collection.is_modified() {
                problems.push(format!("collection {} was modified", collection.name()));
            }
        }
        if problems.is_empty() {
            return Ok(());
        }

        let message = format!("Cache has unexpected changes: {}", problems.join("; "));
        if core.options.production {
            error!("{}", message);
            Ok(())
        } else {
            Err(Error::invariant(message))
        }
    }

    fn has_changes(&self) -> bool {
        let core = self.core();
        !core.deferred.is_empty()
            || !core.deferred_after_save.is_empty()
            || self.collections().iter().any(|c| c.is_modified())
    }
}

async fn flush(
    collections: Vec<&mut dyn DbCacheWritable>,
    store: &dyn DocumentStore,
) -> Result<Changes> {
    let changes = try_join_all(collections.into_iter().map(|c| {
        let name = c.name();
        async move {
            c.update_database_with_data(store)
                .await
                .map_err(|e| Error::CommitFailure(format!("{}: {}", name, e)))
        }
    }))
    .await?;
    Ok(Changes::sum(&changes))
}

/// Exécute les fonctions différées, y compris celles qu'elles diffèrent
pub(crate) fn run_deferred<C: Cache>(cache: &mut C) -> Result<()> {
    loop {
        let batch = std::mem::take(&mut cache.core_mut().deferred);
        if batch.is_empty() {
            return Ok(());
        }
        for f in batch {
            f(cache)?;
        }
    }
}

/// Lance les effets après-commit ; leurs erreurs sont journalisées
pub(crate) async fn run_after_save<C: Cache>(cache: &mut C) {
    let after_save = std::mem::take(&mut cache.core_mut().deferred_after_save);
    for f in after_save {
        if let Err(e) = f.await {
            error!("Error in deferred after-save function: {}", e);
        }
    }
}

/// Commit : travail différé, timeline, pause, reste, puis effets après-commit
pub async fn save_all<C: Cache>(cache: &mut C) -> Result<()> {
    run_deferred(cache)?;

    let store = cache.core().store.clone();
    let delay = cache.core().options.timeline_flush_delay;

    let (high, low): (Vec<_>, Vec<_>) = cache
        .collections_mut()
        .into_iter()
        .partition(|c| c.is_high_priority());

    let high_changes = flush(high, store.as_ref()).await?;
    if high_changes.anything_changed() {
        debug!(?high_changes, "High-priority collections flushed");
        tokio::time::sleep(delay).await;
    }
    let low_changes = flush(low, store.as_ref()).await?;
    debug!(?low_changes, "Remaining collections flushed");

    run_after_save(cache).await;
    Ok(())
}
