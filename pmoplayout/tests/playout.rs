mod common;

use common::*;
use pmoplayout::cache::{Cache, CacheForPlayout};
use pmoplayout::model::{HoldState, Part, PieceInstance, Rundown, RundownPlaylist, Segment};
use pmoplayout::store::{DocumentStore, DocumentStoreExt, SqliteStore};
use pmoplayout::{
    AdLibPart, Error, IngestPart, OperationPriority, StudioWorkerSet, WorkQueue, activate_hold,
    activate_rundown_playlist, deactivate_hold, deactivate_rundown_playlist, insert_parts, move_parts,
    on_part_playback_started, queue_adlib_part, remove_rundown_playlist, replace_part, set_next_part,
    stop_pieces_on_source_layers, swap_parts, take_next_part,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn load_part(store: &dyn DocumentStore, id: &str) -> Option<Part> {
    store.find_doc(id).await.unwrap()
}

async fn wait_queued(ctx: &pmoplayout::PlayoutContext, count: usize) {
    while ctx.locks().queued(PLAYLIST) < count {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_operations_never_overlap() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..12 {
        let ctx = ctx.clone();
        let in_flight = in_flight.clone();
        let max_seen = max_seen.clone();
        let priority = if i % 2 == 0 {
            OperationPriority::Ingest
        } else {
            OperationPriority::UserPlayout
        };
        handles.push(tokio::spawn(async move {
            ctx.run_playout_operation(PLAYLIST, priority, move |_cache, _ctx| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(2));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert!(!ctx.locks().is_locked(PLAYLIST));
}

#[tokio::test]
async fn test_higher_priority_overtakes_queued_work() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    let order = Arc::new(Mutex::new(Vec::new()));

    let busy = ctx.locks().lock(PLAYLIST, OperationPriority::Maintenance).await.unwrap();
    let mut handles = Vec::new();
    for (i, (name, priority)) in [
        ("low1", OperationPriority::Ingest),
        ("low2", OperationPriority::Ingest),
        ("high", OperationPriority::UserPlayout),
    ]
    .into_iter()
    .enumerate()
    {
        let ctx2 = ctx.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            ctx2.run_playout_operation(PLAYLIST, priority, move |_cache, _ctx| {
                order.lock().unwrap().push(name);
                Ok(())
            })
            .await
        }));
        wait_queued(&ctx, i + 1).await;
    }
    drop(busy);
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec!["high", "low1", "low2"]);
}

#[tokio::test]
async fn test_failed_operation_leaves_store_untouched() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    let before = store.dump().unwrap();

    let err = ctx
        .run_playout_operation(PLAYLIST, OperationPriority::UserPlayout, |cache, ctx| {
            cache.parts.update("p1", |p| p.title = "Changed".to_string())?;
            cache.playlist.update(|p| p.name = "Renamed".to_string())?;
            ctx.update_timeline(cache, None)?;
            Err::<(), _>(Error::invalid_state("operator cancelled"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 403);
    assert_eq!(store.dump().unwrap(), before);
    assert!(!ctx.locks().is_locked(PLAYLIST));
}

#[tokio::test]
async fn test_discarded_cache_commits_nothing() {
    let store = three_part_store().await;
    let before = store.dump().unwrap();

    let mut cache = CacheForPlayout::create(store.clone(), PLAYLIST, options().cache).await.unwrap();
    cache.parts.remove("p2").unwrap();
    cache.playlist.update(|p| p.rehearsal = true).unwrap();
    cache.discard_changes();
    cache.assert_no_changes().unwrap();
    cache.save_all_to_database().await.unwrap();

    assert_eq!(store.dump().unwrap(), before);
}

#[tokio::test]
async fn test_timeline_is_committed_first() {
    let store = Arc::new(RecordingStore::new());
    seed(store.as_ref(), &[part("p1", 1.0), part("p2", 2.0)], &[piece("p1_cam", "p1", MIXER_LAYER, 0)])
        .await
        .unwrap();
    store.clear_writes();
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();

    let writes = store.writes();
    assert_eq!(writes.first().map(String::as_str), Some("timeline"));
    assert!(writes.iter().any(|c| c == "rundownPlaylists"));
    assert!(writes.iter().any(|c| c == "partInstances"));
}

#[tokio::test]
async fn test_commit_failure_releases_lock() {
    let store = Arc::new(RecordingStore::new());
    seed(store.as_ref(), &[part("p1", 1.0), part("p2", 2.0)], &[piece("p1_cam", "p1", MIXER_LAYER, 0)])
        .await
        .unwrap();
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();

    store.fail_writes(true);
    let err = take_next_part(&ctx, PLAYLIST).await.unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {}", err);
    assert!(!ctx.locks().is_locked(PLAYLIST));
    assert_eq!(load_playlist(store.as_ref()).await.current_part_instance_id, None);

    store.fail_writes(false);
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    assert!(load_playlist(store.as_ref()).await.current_part_instance_id.is_some());
}

#[tokio::test]
async fn test_activate_and_take_sequence() {
    let store = three_part_store().await;
    let ctx = context(store.clone());

    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert!(playlist.is_active());
    assert_eq!(playlist.current_part_instance_id, None);
    let first_next = playlist.next_part_instance_id.unwrap();
    assert!(first_next.starts_with("p1_"));

    take_next_part(&ctx, PLAYLIST).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(playlist.previous_part_instance_id.as_deref(), Some(first_next.as_str()));
    assert!(playlist.current_part_instance_id.unwrap().starts_with("p2_"));
    assert!(playlist.next_part_instance_id.unwrap().starts_with("p3_"));

    // Après le dernier part, plus de next
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(playlist.next_part_instance_id, None);
    let err = take_next_part(&ctx, PLAYLIST).await.unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_set_next_part_by_id() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();

    set_next_part(&ctx, PLAYLIST, Some("p3".to_string())).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert!(playlist.next_part_instance_id.unwrap().starts_with("p3_"));

    let err = set_next_part(&ctx, PLAYLIST, Some("missing".to_string())).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_second_active_playlist_is_rejected() {
    let store = three_part_store().await;
    store
        .insert_doc(&RundownPlaylist::new("playlist1", STUDIO, "Journal de 20h"))
        .await
        .unwrap();
    store
        .insert_doc(&Rundown {
            id: "rundown1".to_string(),
            playlist_id: "playlist1".to_string(),
            studio_id: STUDIO.to_string(),
            name: "Soir".to_string(),
            rank: 0.0,
        })
        .await
        .unwrap();
    let ctx = context(store.clone());

    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    let err = activate_rundown_playlist(&ctx, "playlist1", false).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    // Changer le mode d'un playlist déjà actif reste permis
    activate_rundown_playlist(&ctx, PLAYLIST, true).await.unwrap();
    assert!(load_playlist(store.as_ref()).await.rehearsal);

    deactivate_rundown_playlist(&ctx, PLAYLIST).await.unwrap();
    activate_rundown_playlist(&ctx, "playlist1", false).await.unwrap();
}

#[tokio::test]
async fn test_deactivate_then_remove() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let err = remove_rundown_playlist(&ctx, PLAYLIST).await.unwrap_err();
    assert_eq!(err.status_code(), 403);

    deactivate_rundown_playlist(&ctx, PLAYLIST).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert!(!playlist.is_active());
    assert_eq!(playlist.current_part_instance_id, None);

    remove_rundown_playlist(&ctx, PLAYLIST).await.unwrap();
    let removed: Option<RundownPlaylist> = store.find_doc(PLAYLIST).await.unwrap();
    assert!(removed.is_none());
    assert_eq!(store.count("parts").unwrap(), 0);
    assert_eq!(store.count("rundowns").unwrap(), 0);
}

#[tokio::test]
async fn test_removal_runs_deferred_and_after_save() {
    let store = three_part_store().await;
    let journal: Arc<Mutex<Vec<&'static str>>> = Arc::default();

    let mut cache = CacheForPlayout::create(store.clone(), PLAYLIST, options().cache).await.unwrap();
    cache.remove_playlist();
    let j = journal.clone();
    cache.defer(move |c: &mut CacheForPlayout| {
        assert!(c.is_marked_for_removal());
        j.lock().unwrap().push("deferred");
        Ok(())
    });
    let j = journal.clone();
    let after_store = store.clone();
    cache.defer_after_save(async move {
        let left: Option<RundownPlaylist> = after_store.find_doc(PLAYLIST).await.unwrap();
        assert!(left.is_none());
        j.lock().unwrap().push("after save");
        Ok(())
    });

    cache.save_all_to_database().await.unwrap();
    assert_eq!(*journal.lock().unwrap(), vec!["deferred", "after save"]);
    assert_eq!(store.count("parts").unwrap(), 0);
}

#[tokio::test]
async fn test_failed_removal_skips_after_save() {
    let store = Arc::new(RecordingStore::new());
    seed(store.as_ref(), &[part("p1", 1.0)], &[piece("p1_cam", "p1", MIXER_LAYER, 0)])
        .await
        .unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let mut cache = CacheForPlayout::create(store.clone(), PLAYLIST, options().cache).await.unwrap();
    cache.remove_playlist();
    let counter = ran.clone();
    cache.defer_after_save(async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    store.fail_writes(true);
    let err = cache.save_all_to_database().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(cache.is_marked_for_removal());

    store.fail_writes(false);
    cache.save_all_to_database().await.unwrap();
    let removed: Option<RundownPlaylist> = store.find_doc(PLAYLIST).await.unwrap();
    assert!(removed.is_none());
}

#[tokio::test]
async fn test_hold_rules() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();

    // Pas de current : pas de hold
    assert_eq!(activate_hold(&ctx, PLAYLIST).await.unwrap_err().status_code(), 403);

    take_next_part(&ctx, PLAYLIST).await.unwrap();
    activate_hold(&ctx, PLAYLIST).await.unwrap();
    assert_eq!(load_playlist(store.as_ref()).await.hold_state, HoldState::Pending);
    assert_eq!(
        set_next_part(&ctx, PLAYLIST, Some("p3".to_string())).await.unwrap_err().status_code(),
        403
    );
    let adlib = AdLibPart {
        title: "Flash".to_string(),
        expected_duration: None,
        autonext: false,
        pieces: Vec::new(),
    };
    assert_eq!(queue_adlib_part(&ctx, PLAYLIST, adlib).await.unwrap_err().status_code(), 403);

    deactivate_hold(&ctx, PLAYLIST).await.unwrap();
    assert_eq!(load_playlist(store.as_ref()).await.hold_state, HoldState::Inactive);

    activate_hold(&ctx, PLAYLIST).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    assert_eq!(load_playlist(store.as_ref()).await.hold_state, HoldState::Active);
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    assert_eq!(load_playlist(store.as_ref()).await.hold_state, HoldState::Complete);
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    assert_eq!(load_playlist(store.as_ref()).await.hold_state, HoldState::Inactive);
}

#[tokio::test]
async fn test_adlib_is_ranked_after_current() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let adlib = AdLibPart {
        title: "Breaking".to_string(),
        expected_duration: Some(5000),
        autonext: false,
        pieces: vec![piece("ignored", "ignored", MIXER_LAYER, 0)],
    };
    let part_id = queue_adlib_part(&ctx, PLAYLIST, adlib).await.unwrap();

    let part = load_part(store.as_ref(), &part_id).await.unwrap();
    assert!(part.rank > 1.0 && part.rank < 2.0, "rank {}", part.rank);
    assert_eq!(part.dynamically_inserted_after_part_id.as_deref(), Some("p1"));

    let playlist = load_playlist(store.as_ref()).await;
    let next = playlist.next_part_instance_id.unwrap();
    assert!(next.starts_with(&part_id));
    let piece: Option<PieceInstance> = store
        .find_doc(&PieceInstance::id_for(&next, &format!("{}_piece0", part_id)))
        .await
        .unwrap();
    assert!(piece.is_some());

    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert!(playlist.next_part_instance_id.unwrap().starts_with("p2_"));
}

#[tokio::test]
async fn test_stop_pieces_on_source_layer() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let current = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();

    // Avant le départ de la lecture, rien à arrêter
    let err = stop_pieces_on_source_layers(&ctx, PLAYLIST, vec![format!("sl_{}", MIXER_LAYER)], 4000)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    on_part_playback_started(&ctx, PLAYLIST, &current, 1000).await.unwrap();
    let stopped = stop_pieces_on_source_layers(&ctx, PLAYLIST, vec![format!("sl_{}", MIXER_LAYER)], 4000)
        .await
        .unwrap();
    assert_eq!(stopped, 1);

    let piece: PieceInstance = store
        .find_doc(&PieceInstance::id_for(&current, "p1_cam"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(piece.user_duration.map(|d| d.end), Some(3000));
}

fn ingest(id: &str) -> IngestPart {
    IngestPart {
        part: part(id, 0.0),
        pieces: vec![piece(&format!("{}_cam", id), id, MIXER_LAYER, 0)],
    }
}

#[tokio::test]
async fn test_ingest_reorders_parts() {
    let store = three_part_store().await;
    let ctx = context(store.clone());

    insert_parts(&ctx, PLAYLIST, SEGMENT, Some("p2"), vec![ingest("p1b")]).await.unwrap();
    let p1b = load_part(store.as_ref(), "p1b").await.unwrap();
    assert!(p1b.rank > 1.0 && p1b.rank < 2.0);

    move_parts(&ctx, PLAYLIST, vec!["p3".to_string()], "p1").await.unwrap();
    let p3 = load_part(store.as_ref(), "p3").await.unwrap();
    assert!(p3.rank < 1.0);

    swap_parts(&ctx, PLAYLIST, "p1", "p2").await.unwrap();
    let p1 = load_part(store.as_ref(), "p1").await.unwrap();
    let p2 = load_part(store.as_ref(), "p2").await.unwrap();
    assert_eq!(p1.rank, 2.0);
    assert_eq!(p2.rank, 1.0);

    replace_part(&ctx, PLAYLIST, "p1b", vec![ingest("p1c"), ingest("p1d")]).await.unwrap();
    assert!(load_part(store.as_ref(), "p1b").await.is_none());
    let c = load_part(store.as_ref(), "p1c").await.unwrap();
    let d = load_part(store.as_ref(), "p1d").await.unwrap();
    assert!(c.rank < d.rank);
    assert!(c.rank > p1b.rank - 1.0 && d.rank < 2.0);
    assert_eq!(store.count("pieces").unwrap(), 5);
}

#[tokio::test]
async fn test_insert_into_other_segment_is_rejected() {
    let store = three_part_store().await;
    store
        .insert_doc(&Segment {
            id: "segment1".to_string(),
            rundown_id: RUNDOWN.to_string(),
            name: "Sport".to_string(),
            rank: 1.0,
        })
        .await
        .unwrap();
    let ctx = context(store.clone());
    let before = store.dump().unwrap();

    let err = insert_parts(&ctx, PLAYLIST, "segment1", None, vec![ingest("p9")]).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert_eq!(store.dump().unwrap(), before);
}

#[tokio::test]
async fn test_orphaned_dynamic_part_is_invalidated() {
    let store = three_part_store().await;
    let mut dynamic = part("dyn", 2.5);
    dynamic.dynamically_inserted_after_part_id = Some("p2".to_string());
    store.insert_doc(&dynamic).await.unwrap();
    let ctx = context(store.clone());

    replace_part(&ctx, PLAYLIST, "p2", vec![ingest("p2x")]).await.unwrap();
    let dynamic = load_part(store.as_ref(), "dyn").await.unwrap();
    assert!(dynamic.invalid);
}

#[tokio::test]
async fn test_sqlite_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("playout.db");

    let current = {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        seed(
            store.as_ref(),
            &[part("p1", 1.0), part("p2", 2.0)],
            &[piece("p1_cam", "p1", MIXER_LAYER, 0)],
        )
        .await
        .unwrap();
        let ctx = context(store.clone());
        activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();
        load_playlist(store.as_ref()).await.current_part_instance_id.unwrap()
    };

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(playlist.current_part_instance_id.as_deref(), Some(current.as_str()));
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, &format!("part_group_{}", current)).is_some());

    // Le moteur reprend là où il s'était arrêté
    let ctx = context(store.clone());
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(playlist.previous_part_instance_id.as_deref(), Some(current.as_str()));
}

#[tokio::test]
async fn test_worker_set_runs_playout_operations() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    let workers = StudioWorkerSet::spawn(STUDIO, ctx, 8);

    workers
        .submit(WorkQueue::StudioControl, |ctx| async move {
            activate_rundown_playlist(&ctx, PLAYLIST, false).await?;
            take_next_part(&ctx, PLAYLIST).await
        })
        .await
        .unwrap();
    workers
        .submit(WorkQueue::Ingest, |ctx| async move {
            insert_parts(&ctx, PLAYLIST, SEGMENT, None, vec![ingest("p4")]).await
        })
        .await
        .unwrap();
    workers.shutdown().await;

    let playlist = load_playlist(store.as_ref()).await;
    assert!(playlist.current_part_instance_id.unwrap().starts_with("p1_"));
    let p4 = load_part(store.as_ref(), "p4").await.unwrap();
    assert!(p4.rank > 3.0);
}
