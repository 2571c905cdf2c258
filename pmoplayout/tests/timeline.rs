mod common;

use common::*;
use pmoplayout::cache::CacheForPlayout;
use pmoplayout::model::{
    DeviceMapping, EnableValue, HoldMode, LookaheadMode, Part, PieceInstance, Segment, TimelineObjectType,
};
use pmoplayout::store::DocumentStoreExt;
use pmoplayout::store::MemoryStore;
use pmoplayout::timeline::{TimelineInput, get_timeline_rundown, part_group_id, timeline_hash};
use pmoplayout::{
    DefaultBlueprint, OperationPriority, activate_hold, activate_rundown_playlist, deactivate_rundown_playlist,
    on_part_playback_started, on_piece_playback_started, take_next_part, update_studio_baseline_operation,
};
use std::sync::Arc;

#[tokio::test]
async fn test_builder_is_deterministic() {
    let store = three_part_store().await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let build = || async {
        let cache = CacheForPlayout::create(store.clone(), PLAYLIST, options().cache).await.unwrap();
        let input = TimelineInput::from_cache(&cache, 1_700_000_000_000).unwrap();
        get_timeline_rundown(&input, &DefaultBlueprint).0
    };
    let first = build().await;
    let second = build().await;

    assert!(!first.is_empty());
    assert_eq!(first, second);
    let first_refs: Vec<_> = first.iter().collect();
    let second_refs: Vec<_> = second.iter().collect();
    assert_eq!(timeline_hash(&first_refs).unwrap(), timeline_hash(&second_refs).unwrap());
}

#[tokio::test]
async fn test_unchanged_rebuild_writes_nothing() {
    let store = Arc::new(RecordingStore::new());
    seed(store.as_ref(), &[part("p1", 1.0), part("p2", 2.0)], &[piece("p1_cam", "p1", MIXER_LAYER, 0)])
        .await
        .unwrap();
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let before = store.inner.dump().unwrap();
    store.clear_writes();
    ctx.run_playout_operation(PLAYLIST, OperationPriority::UserPlayout, |cache, ctx| {
        ctx.update_timeline(cache, None)
    })
    .await
    .unwrap();

    assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
    assert_eq!(store.inner.dump().unwrap(), before);
}

#[tokio::test]
async fn test_autonext_part_groups() {
    let store = Arc::new(MemoryStore::new());
    let mut p1 = part("p1", 1.0);
    p1.expected_duration = Some(10_000);
    p1.autonext = true;
    seed(
        store.as_ref(),
        &[p1, part("p2", 2.0)],
        &[piece("p1_cam", "p1", MIXER_LAYER, 0), piece("p2_cam", "p2", MIXER_LAYER, 0)],
    )
    .await
    .unwrap();
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let playlist = load_playlist(store.as_ref()).await;
    let p1_instance = playlist.current_part_instance_id.clone().unwrap();
    let p2_instance = playlist.next_part_instance_id.clone().unwrap();
    let timeline = load_timeline(store.as_ref()).await;

    let current_group = find_object(&timeline, &part_group_id(&p1_instance)).unwrap();
    assert_eq!(current_group.enable.duration, Some(10_000));
    assert_eq!(current_group.enable.start, Some(EnableValue::Now));

    let next_group = find_object(&timeline, &part_group_id(&p2_instance)).unwrap();
    assert_eq!(
        next_group.enable.start,
        Some(EnableValue::expr(format!("#{}.end - 0", part_group_id(&p1_instance))))
    );

    // Les périphériques annoncent le départ de P2 : il est pris et son groupe ancré
    on_part_playback_started(&ctx, PLAYLIST, &p2_instance, 1_700_000_010_000)
        .await
        .unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(playlist.current_part_instance_id.as_deref(), Some(p2_instance.as_str()));
    let timeline = load_timeline(store.as_ref()).await;
    let group = find_object(&timeline, &part_group_id(&p2_instance)).unwrap();
    assert_eq!(group.enable.start, Some(EnableValue::Time(1_700_000_010_000)));
}

#[tokio::test]
async fn test_infinite_keeps_original_start() {
    let store = Arc::new(MemoryStore::new());
    seed(
        store.as_ref(),
        &[part("pa", 1.0), part("pb", 2.0)],
        &[
            piece("pa_cam", "pa", MIXER_LAYER, 0),
            infinite_piece("pa_logo", "pa", "gfx_logo"),
            piece("pb_cam", "pb", MIXER_LAYER, 0),
        ],
    )
    .await
    .unwrap();
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let a_instance = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();
    on_part_playback_started(&ctx, PLAYLIST, &a_instance, 1000).await.unwrap();
    on_piece_playback_started(&ctx, PLAYLIST, &PieceInstance::id_for(&a_instance, "pa_logo"), 1000)
        .await
        .unwrap();

    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let b_instance = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();
    assert_ne!(a_instance, b_instance);

    let timeline = load_timeline(store.as_ref()).await;
    let infinite_group_id = format!(
        "{}_infinite",
        part_group_id(&PieceInstance::id_for(&b_instance, "pa_logo"))
    );
    let infinite_group = find_object(&timeline, &infinite_group_id).unwrap();
    assert_eq!(infinite_group.enable.start, Some(EnableValue::Time(1000)));

    let b_group = find_object(&timeline, &part_group_id(&b_instance)).unwrap();
    assert_eq!(b_group.enable.start, Some(EnableValue::Now));
}

#[tokio::test]
async fn test_previous_part_group() {
    // (p1 autonext + recouvrement, preroll de p2, décalage de fin attendu)
    for (autonext_overlap, p2_preroll, expected_offset) in [(None, Some(300), 300), (Some(500), None, 500)] {
        let store = Arc::new(MemoryStore::new());
        let mut p1 = part("p1", 1.0);
        p1.autonext = autonext_overlap.is_some();
        p1.autonext_overlap = autonext_overlap;
        let mut p2 = part("p2", 2.0);
        p2.preroll_duration = p2_preroll;
        seed(
            store.as_ref(),
            &[p1, p2, part("p3", 3.0)],
            &[
                piece("p1_cam", "p1", MIXER_LAYER, 0),
                infinite_piece("p1_logo", "p1", "gfx_logo"),
                piece("p2_cam", "p2", MIXER_LAYER, 0),
            ],
        )
        .await
        .unwrap();
        let ctx = context(store.clone());
        activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();
        let p1_instance = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();
        on_part_playback_started(&ctx, PLAYLIST, &p1_instance, 1000).await.unwrap();

        take_next_part(&ctx, PLAYLIST).await.unwrap();
        let playlist = load_playlist(store.as_ref()).await;
        let p2_instance = playlist.current_part_instance_id.unwrap();
        assert_eq!(playlist.previous_part_instance_id.as_deref(), Some(p1_instance.as_str()));

        let timeline = load_timeline(store.as_ref()).await;
        let previous_group_id = format!("previous_{}", part_group_id(&p1_instance));
        let previous_group = find_object(&timeline, &previous_group_id).unwrap();
        assert_eq!(previous_group.enable.start, Some(EnableValue::Time(1000)));
        assert_eq!(
            previous_group.enable.end,
            Some(EnableValue::expr(format!(
                "#{}.start + {}",
                part_group_id(&p2_instance),
                expected_offset
            )))
        );

        let previous_cam = find_object(&timeline, "previous_p1_cam_obj").unwrap();
        assert!(previous_cam.in_group.as_deref().is_some_and(|g| g.starts_with("previous_")));

        // Le logo continue dans p2 : il n'apparaît que dans le groupe infini du current
        assert!(find_object(&timeline, "previous_p1_logo_obj").is_none());
        assert!(
            timeline
                .iter()
                .filter(|o| o.id.starts_with("previous_"))
                .all(|o| o.infinite_piece_id.is_none())
        );
        let logo_group_id = format!(
            "{}_infinite",
            part_group_id(&PieceInstance::id_for(&p2_instance, "p1_logo"))
        );
        assert!(find_object(&timeline, &logo_group_id).is_some());
    }
}

#[tokio::test]
async fn test_infinite_capped_at_current_end_when_not_continuing() {
    // Sans suite dans le segment suivant, l'infini s'arrête avec son part
    for (next_segment, capped) in [("segment1", true), (SEGMENT, false)] {
        let store = Arc::new(MemoryStore::new());
        let mut p1 = part("p1", 1.0);
        p1.autonext = true;
        p1.expected_duration = Some(10_000);
        let mut p2 = Part::new("p2", RUNDOWN, next_segment, 2.0);
        p2.title = "P2".to_string();
        seed(
            store.as_ref(),
            &[p1, p2],
            &[
                piece("p1_cam", "p1", MIXER_LAYER, 0),
                infinite_piece("p1_logo", "p1", "gfx_logo"),
                piece("p2_cam", "p2", MIXER_LAYER, 0),
            ],
        )
        .await
        .unwrap();
        store
            .insert_doc(&Segment {
                id: "segment1".to_string(),
                rundown_id: RUNDOWN.to_string(),
                name: "Suite".to_string(),
                rank: 1.0,
            })
            .await
            .unwrap();

        let ctx = context(store.clone());
        activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();

        let playlist = load_playlist(store.as_ref()).await;
        let p1_instance = playlist.current_part_instance_id.unwrap();
        assert!(playlist.next_part_instance_id.is_some());

        let timeline = load_timeline(store.as_ref()).await;
        let logo_group_id = format!(
            "{}_infinite",
            part_group_id(&PieceInstance::id_for(&p1_instance, "p1_logo"))
        );
        let logo_group = find_object(&timeline, &logo_group_id).unwrap();
        let expected_end = capped.then(|| EnableValue::expr(format!("#{}.end", part_group_id(&p1_instance))));
        assert_eq!(logo_group.enable.end, expected_end, "next part in {}", next_segment);
    }
}

/// P1 puis P2, P2 ouvrant sur une transition au mélangeur
async fn transition_store(preroll: i64, transition_preroll: i64, disable_out_transition: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let mut p1 = part("p1", 1.0);
    p1.disable_out_transition = disable_out_transition;
    let mut p2 = part("p2", 2.0);
    p2.preroll_duration = Some(preroll);
    p2.transition_preroll_duration = Some(transition_preroll);
    let mut wipe = piece("p2_wipe", "p2", MIXER_LAYER, 0);
    wipe.is_transition = true;
    wipe.enable.duration = Some(1000);
    seed(
        store.as_ref(),
        &[p1, p2],
        &[piece("p1_cam", "p1", MIXER_LAYER, 0), wipe, piece("p2_clip", "p2", VIDEO_LAYER, 0)],
    )
    .await
    .unwrap();
    store
}

#[tokio::test]
async fn test_transition_delays_part_contents() {
    // (preroll, preroll de transition, départ du piece de transition, décalage du contenu)
    for (preroll, transition_preroll, transition_start, contents_offset) in
        [(200, 1000, 0, "+ 800"), (500, 200, 300, "- 300")]
    {
        let store = transition_store(preroll, transition_preroll, false).await;
        let ctx = context(store.clone());
        activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();

        let p2_instance = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();
        let timeline = load_timeline(store.as_ref()).await;
        let wipe_group_id = format!("piece_group_{}", PieceInstance::id_for(&p2_instance, "p2_wipe"));
        let clip_group_id = format!("piece_group_{}", PieceInstance::id_for(&p2_instance, "p2_clip"));

        let wipe_group = find_object(&timeline, &wipe_group_id).unwrap();
        assert_eq!(wipe_group.enable.start, Some(EnableValue::Time(transition_start)));
        let clip_group = find_object(&timeline, &clip_group_id).unwrap();
        assert_eq!(
            clip_group.enable.start,
            Some(EnableValue::expr(format!("#{}.start {}", wipe_group_id, contents_offset)))
        );
    }
}

#[tokio::test]
async fn test_disabled_out_transition_cuts_directly() {
    let store = transition_store(200, 1000, true).await;
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let p2_instance = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();
    let timeline = load_timeline(store.as_ref()).await;
    let wipe_group_id = format!("piece_group_{}", PieceInstance::id_for(&p2_instance, "p2_wipe"));
    let clip_group_id = format!("piece_group_{}", PieceInstance::id_for(&p2_instance, "p2_clip"));

    assert!(find_object(&timeline, &wipe_group_id).is_none());
    assert!(find_object(&timeline, "p2_wipe_obj").is_none());
    let clip_group = find_object(&timeline, &clip_group_id).unwrap();
    assert_eq!(clip_group.enable.start, Some(EnableValue::Time(0)));
}

#[tokio::test]
async fn test_hold_filters_objects() {
    let store = Arc::new(MemoryStore::new());
    let mut p2_piece = piece("p2_cam", "p2", MIXER_LAYER, 0);
    let mut only = p2_piece.content.timeline_objects[0].clone();
    only.id = "p2_hold_only".to_string();
    only.hold_mode = Some(HoldMode::Only);
    let mut except = p2_piece.content.timeline_objects[0].clone();
    except.id = "p2_hold_except".to_string();
    except.hold_mode = Some(HoldMode::Except);
    p2_piece.content.timeline_objects = vec![only, except];

    seed(
        store.as_ref(),
        &[part("p1", 1.0), part("p2", 2.0), part("p3", 3.0)],
        &[piece("p1_cam", "p1", MIXER_LAYER, 0), p2_piece],
    )
    .await
    .unwrap();
    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    activate_hold(&ctx, PLAYLIST).await.unwrap();

    // Le take arme le hold et passe sur P2
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, "p2_hold_only").is_some());
    assert!(find_object(&timeline, "p2_hold_except").is_none());
    let current = load_playlist(store.as_ref()).await.current_part_instance_id;

    // Le take suivant termine le hold sans changer de part
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(playlist.current_part_instance_id, current);
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, "p2_hold_only").is_none());
    assert!(find_object(&timeline, "p2_hold_except").is_some());
}

#[tokio::test]
async fn test_failing_customization_keeps_timeline() {
    let store = three_part_store().await;
    let ctx = context_with_blueprint(store.clone(), Arc::new(FailingBlueprint));
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let current = load_playlist(store.as_ref()).await.current_part_instance_id.unwrap();
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, &part_group_id(&current)).is_some());
    assert!(find_object(&timeline, &format!("{}_status", PLAYLIST)).is_some());
    assert!(find_object(&timeline, "p1_cam_obj").is_some());
}

#[tokio::test]
async fn test_customization_state_is_persisted() {
    let store = three_part_store().await;
    let ctx = context_with_blueprint(store.clone(), Arc::new(CountingBlueprint));
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let playlist = load_playlist(store.as_ref()).await;
    assert_eq!(
        playlist.previous_persistent_state,
        Some(serde_json::json!({"generations": 2}))
    );
}

#[tokio::test]
async fn test_studio_baseline_when_idle() {
    let store = three_part_store().await;
    let ctx = context_with_blueprint(store.clone(), Arc::new(CountingBlueprint));

    assert!(update_studio_baseline_operation(&ctx, STUDIO).await.unwrap());
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, "studio_idle").is_some());
    let version = find_object(&timeline, "baseline_version").unwrap();
    assert_eq!(
        version.metadata.as_ref().unwrap()["versions"]["blueprintVersion"],
        "1.2.0"
    );
    assert!(timeline.iter().any(|o| o.object_type == TimelineObjectType::Stat));

    activate_rundown_playlist(&ctx, PLAYLIST, true).await.unwrap();
    assert!(!update_studio_baseline_operation(&ctx, STUDIO).await.unwrap());
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, "studio_idle").is_none());
    assert!(find_object(&timeline, &format!("{}_status", PLAYLIST)).unwrap().has_class("rundown_rehersal"));

    deactivate_rundown_playlist(&ctx, PLAYLIST).await.unwrap();
    let timeline = load_timeline(store.as_ref()).await;
    assert!(find_object(&timeline, "studio_idle").is_some());
    assert!(find_object(&timeline, &format!("{}_status", PLAYLIST)).is_none());
}

/// P1 current, P2..P4 sans contenu sur la couche vidéo, P5 avec
async fn lookahead_store(max_search_distance: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    seed(
        store.as_ref(),
        &[part("p1", 1.0), part("p2", 2.0), part("p3", 3.0), part("p4", 4.0), part("p5", 5.0)],
        &[
            piece("p1_cam", "p1", MIXER_LAYER, 0),
            piece("p2_cam", "p2", MIXER_LAYER, 0),
            piece("p3_cam", "p3", MIXER_LAYER, 0),
            piece("p4_cam", "p4", MIXER_LAYER, 0),
            piece("p5_clip", "p5", VIDEO_LAYER, 0),
        ],
    )
    .await
    .unwrap();
    let mut studio = studio();
    if let Some(mapping) = studio.mappings.get_mut(VIDEO_LAYER) {
        mapping.lookahead_max_search_distance = Some(max_search_distance);
    }
    replace_studio(store.as_ref(), &studio).await.unwrap();
    store
}

#[tokio::test]
async fn test_lookahead_respects_search_distance() {
    for (distance, expected) in [(3, false), (4, true)] {
        let store = lookahead_store(distance).await;
        let ctx = context(store.clone());
        activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();

        let timeline = load_timeline(store.as_ref()).await;
        let found = timeline
            .iter()
            .any(|o| o.is_lookahead && o.lookahead_for_layer.as_deref() == Some(VIDEO_LAYER));
        assert_eq!(found, expected, "max search distance {}", distance);
        if expected {
            let obj = find_object(&timeline, "lookahead_future0_p5_clip_obj").unwrap();
            assert_eq!(obj.layer, format!("{}_lookahead", VIDEO_LAYER));
        }
    }
}

#[tokio::test]
async fn test_lookahead_does_not_depend_on_device_type() {
    for device in [DeviceMapping::Abstract, DeviceMapping::Http] {
        let store = lookahead_store(4).await;
        let mut studio = studio();
        if let Some(mapping) = studio.mappings.get_mut(VIDEO_LAYER) {
            mapping.device = device.clone();
            mapping.lookahead_max_search_distance = Some(4);
        }
        replace_studio(store.as_ref(), &studio).await.unwrap();

        let ctx = context(store.clone());
        activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
        take_next_part(&ctx, PLAYLIST).await.unwrap();

        let timeline = load_timeline(store.as_ref()).await;
        let obj = find_object(&timeline, "lookahead_future0_p5_clip_obj");
        assert!(obj.is_some(), "no lookahead for {:?}", device);
        assert_eq!(obj.unwrap().lookahead_for_layer.as_deref(), Some(VIDEO_LAYER));
    }
}

#[tokio::test]
async fn test_lookahead_future_part_keeps_every_candidate() {
    let store = Arc::new(MemoryStore::new());
    seed(
        store.as_ref(),
        &[part("p1", 1.0), part("p2", 2.0)],
        &[
            piece("p1_cam", "p1", MIXER_LAYER, 0),
            piece("p2_clip_a", "p2", VIDEO_LAYER, 0),
            piece("p2_clip_b", "p2", VIDEO_LAYER, 5000),
        ],
    )
    .await
    .unwrap();
    let mut studio = studio();
    if let Some(mapping) = studio.mappings.get_mut(VIDEO_LAYER) {
        mapping.lookahead = LookaheadMode::WhenClear;
        mapping.lookahead_depth = Some(2);
    }
    replace_studio(store.as_ref(), &studio).await.unwrap();

    let ctx = context(store.clone());
    activate_rundown_playlist(&ctx, PLAYLIST, false).await.unwrap();
    take_next_part(&ctx, PLAYLIST).await.unwrap();

    let timeline = load_timeline(store.as_ref()).await;
    let mut clips: Vec<String> = timeline
        .iter()
        .filter(|o| o.is_lookahead && o.layer == VIDEO_LAYER)
        .filter_map(|o| o.content["clip"].as_str().map(str::to_string))
        .collect();
    clips.sort();
    assert_eq!(clips, vec!["p2_clip_a".to_string(), "p2_clip_b".to_string()]);
}
