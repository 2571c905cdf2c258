//! Workers d'un studio
//!
//! Trois files de travaux par studio (ingest, contrôle, évènements), chacune
//! vidée par sa propre tâche tokio : un arriéré d'ingest ne retarde pas un
//! take. Toutes les files partagent le même gestionnaire de verrous, qui
//! reste seul garant de l'exclusion par playlist.
//!
//! # Exemple
//!
//! ```no_run
//! use pmoplayout::{PlayoutContext, StudioWorkerSet, WorkQueue, take_next_part};
//!
//! # async fn example(ctx: PlayoutContext) -> pmoplayout::Result<()> {
//! let workers = StudioWorkerSet::spawn("studio0", ctx, 64);
//! workers
//!     .submit(WorkQueue::StudioControl, |ctx| async move {
//!         take_next_part(&ctx, "playlist0").await
//!     })
//!     .await?;
//! workers.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::playout::PlayoutContext;
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Classe de travaux, une file par classe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkQueue {
    Ingest,
    StudioControl,
    Events,
}

impl fmt::Display for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkQueue::Ingest => "ingest",
            WorkQueue::StudioControl => "studio-control",
            WorkQueue::Events => "events",
        };
        f.write_str(name)
    }
}

type Job = Box<dyn FnOnce(PlayoutContext) -> BoxFuture<'static, ()> + Send>;

/// Les trois workers d'un studio
pub struct StudioWorkerSet {
    studio_id: String,
    ingest: mpsc::Sender<Job>,
    control: mpsc::Sender<Job>,
    events: mpsc::Sender<Job>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

async fn run_worker(
    studio_id: String,
    queue: WorkQueue,
    ctx: PlayoutContext,
    mut rx: mpsc::Receiver<Job>,
    cancel: CancellationToken,
) {
    debug!(studio_id = %studio_id, %queue, "Worker started");
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        job(ctx.clone()).await;
    }
    debug!(studio_id = %studio_id, %queue, "Worker stopped");
}

impl StudioWorkerSet {
    /// Lance les trois tâches ; `capacity` borne chaque file
    pub fn spawn(studio_id: &str, ctx: PlayoutContext, capacity: usize) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(3);
        let mut senders = Vec::with_capacity(3);

        for queue in [WorkQueue::Ingest, WorkQueue::StudioControl, WorkQueue::Events] {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                studio_id.to_string(),
                queue,
                ctx.clone(),
                rx,
                cancel.clone(),
            )));
        }

        let mut senders = senders.into_iter();
        let (Some(ingest), Some(control), Some(events)) = (senders.next(), senders.next(), senders.next()) else {
            unreachable!("three queues are always created");
        };
        info!(studio_id, "Studio workers spawned");
        Self {
            studio_id: studio_id.to_string(),
            ingest,
            control,
            events,
            cancel,
            handles,
        }
    }

    pub fn studio_id(&self) -> &str {
        &self.studio_id
    }

    fn sender(&self, queue: WorkQueue) -> &mpsc::Sender<Job> {
        match queue {
            WorkQueue::Ingest => &self.ingest,
            WorkQueue::StudioControl => &self.control,
            WorkQueue::Events => &self.events,
        }
    }

    /// Soumet un travail et attend son résultat
    pub async fn submit<T, F, Fut>(&self, queue: WorkQueue, f: F) -> Result<T>
    where
        F: FnOnce(PlayoutContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx| {
            Box::pin(async move {
                // l'appelant a pu abandonner l'attente
                let _ = tx.send(f(ctx).await);
            })
        });

        self.sender(queue)
            .send(job)
            .await
            .map_err(|_| Error::invalid_state(format!("Worker queue {} of studio {} is closed", queue, self.studio_id)))?;
        rx.await.map_err(|_| {
            Error::invalid_state(format!("Worker {} of studio {} dropped the job", queue, self.studio_id))
        })?
    }

    /// Arrête les workers après le travail en cours
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(studio_id = %self.studio_id, "Worker task failed: {}", e);
            }
        }
        info!(studio_id = %self.studio_id, "Studio workers stopped");
    }
}

/// Un jeu de workers par studio, créé à la demande
pub struct WorkerManager {
    ctx: PlayoutContext,
    capacity: usize,
    workers: Mutex<HashMap<String, Arc<StudioWorkerSet>>>,
}

impl WorkerManager {
    pub fn new(ctx: PlayoutContext, capacity: usize) -> Self {
        Self {
            ctx,
            capacity,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn studio(&self, studio_id: &str) -> Arc<StudioWorkerSet> {
        let mut workers = self.workers.lock().await;
        workers
            .entry(studio_id.to_string())
            .or_insert_with(|| Arc::new(StudioWorkerSet::spawn(studio_id, self.ctx.clone(), self.capacity)))
            .clone()
    }

    /// Arrête tous les studios dont plus personne ne détient les workers
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, Arc<StudioWorkerSet>)> = self.workers.lock().await.drain().collect();
        for (studio_id, workers) in drained {
            match Arc::try_unwrap(workers) {
                Ok(workers) => workers.shutdown().await,
                Err(shared) => {
                    warn!(studio_id = %studio_id, "Workers still in use, cancelling without waiting");
                    shared.cancel.cancel();
                }
            }
        }
    }
}
