mod logs;
mod mock;

use mock::{DemoBlueprint, PLAYLIST_ID, STUDIO_ID};
use pmoconfig::get_config;
use pmoplayout::model::RundownPlaylist;
use pmoplayout::store::DocumentStoreExt;
use pmoplayout::{
    DocumentStore, PlayoutConfigExt, PlayoutContext, PlayoutOptions, SqliteStore, WorkQueue, WorkerManager,
    activate_rundown_playlist, deactivate_rundown_playlist, get_current_time, on_part_playback_started,
    take_next_part, update_studio_baseline_operation,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Intervalle entre deux takes de la démonstration
const TAKE_INTERVAL: Duration = Duration::from_secs(3);

async fn load_playlist(store: &dyn DocumentStore) -> anyhow::Result<RundownPlaylist> {
    let playlist: Option<RundownPlaylist> = store.find_doc(PLAYLIST_ID).await?;
    playlist.ok_or_else(|| anyhow::anyhow!("Playlist {} not found", PLAYLIST_ID))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========
    let _log_handle = logs::init_logging();
    let config = get_config();

    let db_path = config.playout_db_path()?;
    info!("💾 Opening playout database at {}", db_path.display());
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(&db_path)?);

    if mock::seed_if_empty(store.as_ref()).await? {
        info!("🌱 Demo rundown seeded for studio {}", STUDIO_ID);
    }

    let options = PlayoutOptions {
        cache: config.cache_options()?,
        clock: config.studio_clock()?,
    };
    let ctx = PlayoutContext::new(store.clone(), Arc::new(DemoBlueprint), options);
    let manager = WorkerManager::new(ctx, config.worker_queue_capacity()?);
    let workers = manager.studio(STUDIO_ID).await;

    // ========== PHASE 2 : Mise à l'antenne ==========
    let changed = workers
        .submit(WorkQueue::StudioControl, |ctx| async move {
            update_studio_baseline_operation(&ctx, STUDIO_ID).await
        })
        .await?;
    info!("📺 Studio baseline {}", if changed { "updated" } else { "unchanged" });

    workers
        .submit(WorkQueue::StudioControl, |ctx| async move {
            activate_rundown_playlist(&ctx, PLAYLIST_ID, true).await
        })
        .await?;
    info!("✅ Playlist {} activated (rehearsal)", PLAYLIST_ID);

    // ========== PHASE 3 : Takes successifs ==========
    let mut ticker = tokio::time::interval(TAKE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Interrupted, leaving the air");
                break;
            }
        }

        let playlist = load_playlist(store.as_ref()).await?;
        if playlist.next_part_instance_id.is_none() {
            info!("🏁 No next part, end of rundown");
            break;
        }

        if let Err(e) = workers
            .submit(WorkQueue::StudioControl, |ctx| async move {
                take_next_part(&ctx, PLAYLIST_ID).await
            })
            .await
        {
            warn!("⚠️ Take failed: {}", e);
            continue;
        }

        let playlist = load_playlist(store.as_ref()).await?;
        let Some(current) = playlist.current_part_instance_id else {
            continue;
        };
        info!("🎬 On air: {}", current);

        // les périphériques confirment le départ
        let started_at = get_current_time();
        let part_instance_id = current.clone();
        if let Err(e) = workers
            .submit(WorkQueue::Events, move |ctx| async move {
                on_part_playback_started(&ctx, PLAYLIST_ID, &part_instance_id, started_at).await
            })
            .await
        {
            warn!("⚠️ Playback report for {} failed: {}", current, e);
        }
    }

    // ========== PHASE 4 : Arrêt ==========
    workers
        .submit(WorkQueue::StudioControl, |ctx| async move {
            deactivate_rundown_playlist(&ctx, PLAYLIST_ID).await
        })
        .await?;
    info!("📴 Playlist {} deactivated", PLAYLIST_ID);

    drop(workers);
    manager.shutdown_all().await;
    Ok(())
}
