//! Sections critiques par playlist, ordonnées par priorité
//!
//! Une seule opération à la fois par clé (playlist ou studio). Les
//! opérations en attente sont servies par priorité décroissante, puis dans
//! l'ordre d'arrivée. Une opération déjà lancée n'est jamais préemptée.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::trace;

/// Classe de priorité d'une opération
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationPriority {
    /// Nettoyage, tâches de fond
    Maintenance,
    /// Ingest automatique
    Ingest,
    /// Modification d'ingest demandée par un utilisateur
    UserIngest,
    /// Take, ad-lib, hold...
    UserPlayout,
    /// Rappels des périphériques (lecture démarrée)
    CallbackPlayout,
}

impl fmt::Display for OperationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationPriority::Maintenance => "maintenance",
            OperationPriority::Ingest => "ingest",
            OperationPriority::UserIngest => "user_ingest",
            OperationPriority::UserPlayout => "user_playout",
            OperationPriority::CallbackPlayout => "callback_playout",
        };
        f.write_str(name)
    }
}

struct Waiter {
    priority: OperationPriority,
    seq: u64,
    tx: oneshot::Sender<PlaylistLock>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // tas max : priorité la plus haute, puis arrivée la plus ancienne
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct KeyState {
    queue: BinaryHeap<Waiter>,
}

#[derive(Default)]
struct Inner {
    /// Clés verrouillées, avec leur file d'attente
    held: HashMap<String, KeyState>,
    seq: u64,
}

/// Gestionnaire des verrous, partagé par tous les workers d'un processus
#[derive(Clone, Default)]
pub struct PlaylistLockManager {
    inner: Arc<Mutex<Inner>>,
}

/// Verrou détenu ; le relâcher passe la main à l'attente suivante
pub struct PlaylistLock {
    inner: Arc<Mutex<Inner>>,
    key: String,
    armed: bool,
}

fn state(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlaylistLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attend la section critique de `key`
    pub async fn lock(&self, key: &str, priority: OperationPriority) -> Result<PlaylistLock> {
        let rx = {
            let mut inner = state(&self.inner);
            if !inner.held.contains_key(key) {
                inner.held.insert(key.to_string(), KeyState::default());
                trace!(key, %priority, "Lock acquired immediately");
                return Ok(self.guard(key));
            }
            inner.seq += 1;
            let seq = inner.seq;
            let (tx, rx) = oneshot::channel();
            if let Some(key_state) = inner.held.get_mut(key) {
                key_state.queue.push(Waiter { priority, seq, tx });
            }
            trace!(key, %priority, seq, "Lock busy, queued");
            rx
        };
        rx.await
            .map_err(|_| Error::invariant(format!("Lock queue for {} was dropped", key)))
    }

    fn guard(&self, key: &str) -> PlaylistLock {
        PlaylistLock {
            inner: self.inner.clone(),
            key: key.to_string(),
            armed: true,
        }
    }

    pub fn is_locked(&self, key: &str) -> bool {
        state(&self.inner).held.contains_key(key)
    }

    /// Nombre d'opérations en attente sur `key`
    pub fn queued(&self, key: &str) -> usize {
        state(&self.inner).held.get(key).map_or(0, |s| s.queue.len())
    }
}

impl PlaylistLock {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for PlaylistLock {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = state(&self.inner);
        loop {
            let Some(waiter) = inner.held.get_mut(&self.key).and_then(|s| s.queue.pop()) else {
                inner.held.remove(&self.key);
                trace!(key = %self.key, "Lock released");
                return;
            };
            let next = PlaylistLock {
                inner: self.inner.clone(),
                key: self.key.clone(),
                armed: true,
            };
            match waiter.tx.send(next) {
                Ok(()) => {
                    trace!(key = %self.key, seq = waiter.seq, "Lock handed over");
                    return;
                }
                // L'attente a été abandonnée : on passe à la suivante
                Err(mut unclaimed) => unclaimed.armed = false,
            }
        }
    }
}
