//! Construction des groupes de parts et de pieces d'un playlist actif

use super::enable::{Edge, prefix_all_object_ids, reference, reference_minus};
use super::pieces::{
    PieceInstanceWithTimings, create_piece_group_and_cap, create_piece_group_first_object,
    has_definitely_ended, piece_group_id, process_and_prune_piece_instance_timings,
};
use super::timings::{part_keepalive_duration, part_overlap_duration, part_target_duration};
use super::{SelectedPart, TimelineInput};
use crate::model::{
    EnableValue, HoldMode, HoldState, PartInstance, RundownPlaylist, TimelineEnable, TimelineObject,
    TimelineObjectType,
};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

pub fn part_group_id(part_instance_id: &str) -> String {
    format!("part_group_{}", part_instance_id)
}

pub fn part_first_object_id(part_instance_id: &str) -> String {
    format!("part_group_firstobject_{}", part_instance_id)
}

/// Paramètres de transition du part reçu
#[derive(Debug, Clone, Copy, Default)]
struct TransitionProps {
    allowed: bool,
    preroll: Option<i64>,
    transition_preroll: Option<i64>,
    transition_keepalive: Option<i64>,
}

impl TransitionProps {
    fn for_part(instance: &PartInstance, allowed: bool) -> Self {
        Self {
            allowed,
            preroll: instance.part.preroll_duration,
            transition_preroll: instance.part.transition_preroll_duration,
            transition_keepalive: instance.part.transition_keepalive_duration,
        }
    }
}

struct PartTransform<'a> {
    playlist_id: &'a str,
    part_id: &'a str,
    first_object_classes: Vec<String>,
    part_group_id: &'a str,
    now_in_part: i64,
    is_absolute_infinite_group: bool,
    transition: Option<TransitionProps>,
    hold_state: Option<HoldState>,
    show_hold_except: bool,
}

fn status_object(playlist: &RundownPlaylist) -> TimelineObject {
    let class = if playlist.rehearsal {
        "rundown_rehersal"
    } else {
        "rundown_active"
    };
    TimelineObject::new(
        format!("{}_status", playlist.id),
        "rundown_status",
        TimelineEnable::while_(EnableValue::Time(1)),
    )
    .with_content(json!({"deviceType": "abstract"}))
    .with_classes(vec![class.to_string()])
}

fn create_part_group(instance: &PartInstance, mut enable: TimelineEnable) -> TimelineObject {
    if matches!(enable.start, None | Some(EnableValue::Time(0))) {
        enable.start = Some(EnableValue::Now);
    }
    let mut group = TimelineObject::new(part_group_id(&instance.id), "", enable)
        .with_content(json!({"deviceType": "abstract", "type": "group"}));
    group.priority = 5.0;
    group.is_group = true;
    group
}

fn create_part_group_first_object(
    playlist_id: &str,
    instance: &PartInstance,
    part_group_id: &str,
    previous: Option<&PartInstance>,
) -> TimelineObject {
    let mut classes = instance.part.classes.clone();
    if let Some(prev) = previous {
        classes.extend(prev.part.classes_for_next.iter().cloned());
    }
    let mut obj = TimelineObject::new(
        part_first_object_id(&instance.id),
        "group_first_object",
        TimelineEnable::start_at(0i64),
    )
    .with_content(json!({
        "deviceType": "abstract",
        "type": "callback",
        "callBack": "partPlaybackStarted",
        "callBackData": {
            "rundownPlaylistId": playlist_id,
            "partInstanceId": instance.id,
        },
        "callBackStopped": "partPlaybackStopped",
    }))
    .with_classes(classes);
    obj.in_group = Some(part_group_id.to_string());
    obj
}

fn transform_part_into_timeline(
    pieces: &[PieceInstanceWithTimings],
    t: &PartTransform<'_>,
) -> Vec<TimelineObject> {
    let mut objects = Vec::new();

    let is_hold = t.hold_state == Some(HoldState::Active);
    let allow_transition = t.transition.is_some_and(|tp| tp.allowed)
        && !is_hold
        && t.hold_state != Some(HoldState::Complete);
    let transition = if allow_transition {
        pieces.iter().find(|p| p.instance.piece.is_transition)
    } else {
        None
    };
    let props = t.transition.unwrap_or_default();
    let piece_delay =
        (props.preroll.unwrap_or(0) - props.transition_preroll.unwrap_or(0)).max(0);
    let contents_delay = props.transition_preroll.unwrap_or(0) - props.preroll.unwrap_or(0);

    for piece in pieces {
        let instance = &piece.instance;
        if instance.disabled {
            continue;
        }
        if instance.piece.is_transition && !allow_transition {
            continue;
        }

        let is_continuation = instance.is_infinite_continuation(t.part_id);

        let mut enable = TimelineEnable::default();
        match instance.user_duration {
            Some(ud) => enable.end = Some(EnableValue::Time(ud.end)),
            None => enable.duration = instance.piece.enable.duration,
        }

        if t.is_absolute_infinite_group {
            enable.start = Some(EnableValue::Time(0));
        } else {
            let start = instance.piece.enable.start;
            enable.start = Some(EnableValue::Time(start));
            if start == 0 && !is_continuation {
                match transition {
                    Some(trans)
                        if !instance.piece.is_transition && instance.piece.ad_lib_source_id.is_none() =>
                    {
                        enable.start = Some(reference(
                            &piece_group_id(&trans.instance.id),
                            Edge::Start,
                            Some(contents_delay),
                        ));
                    }
                    _ if instance.piece.is_transition && piece_delay > 0 => {
                        enable.start = Some(EnableValue::Time(piece_delay));
                    }
                    _ => {}
                }
            }
        }

        let (group, caps) = create_piece_group_and_cap(piece, t.part_group_id, enable);
        let group_id = group.id.clone();
        objects.push(group);
        objects.extend(caps);

        let content = &instance.piece.content.timeline_objects;
        if instance.piece.is_virtual || content.is_empty() || has_definitely_ended(piece, t.now_in_part) {
            continue;
        }

        objects.push(create_piece_group_first_object(
            t.playlist_id,
            instance,
            &group_id,
            &t.first_object_classes,
        ));

        for o in content {
            match o.hold_mode {
                Some(HoldMode::Except) if is_hold && !t.show_hold_except => continue,
                Some(HoldMode::Only) if !is_hold => continue,
                _ => {}
            }
            let mut obj = o.clone();
            obj.in_group = Some(group_id.clone());
            obj.object_type = TimelineObjectType::Rundown;
            obj.piece_instance_id = Some(instance.id.clone());
            obj.infinite_piece_id = instance.infinite_piece_id().map(str::to_string);
            objects.push(obj);
        }
    }
    objects
}

fn is_current_infinite(p: &PieceInstanceWithTimings) -> bool {
    p.instance.infinite.is_some() && p.instance.piece.lifespan.is_infinite()
}

/// Objets du playlist actif, hors lookahead et personnalisation
pub fn build_timeline_objs_for_rundown(input: &TimelineInput) -> Vec<TimelineObject> {
    let playlist = &input.playlist;
    let now = input.now;
    let mut objects = vec![status_object(playlist)];

    objects.extend(input.baseline.iter().cloned().map(|mut o| {
        o.object_type = TimelineObjectType::Rundown;
        o
    }));

    if let Some(current) = &input.current {
        build_current_and_next(input, current, &mut objects, now);
    } else if input.next.is_none() {
        info!(playlist_id = %playlist.id, "No next part and no current part set on playlist");
    }
    objects
}

fn build_current_and_next(
    input: &TimelineInput,
    current: &SelectedPart,
    objects: &mut Vec<TimelineObject>,
    now: i64,
) {
    let playlist = &input.playlist;
    let cur = &current.instance;
    let previous = input.previous.as_ref();
    let next = input.next.as_ref();

    let part_last_started = cur.last_started_playback();
    let now_in_part = part_last_started.map_or(0, |s| now - s);

    let (infinites, normals): (Vec<_>, Vec<_>) =
        process_and_prune_piece_instance_timings(&cur.part.id, current.pieces.clone())
            .into_iter()
            .partition(is_current_infinite);
    let current_infinite_ids: HashSet<String> = infinites
        .iter()
        .filter_map(|p| p.instance.infinite_piece_id().map(str::to_string))
        .collect();

    let is_followed = next.is_some() && cur.part.autonext;
    let mut current_enable = TimelineEnable {
        duration: is_followed.then(|| part_target_duration(previous.map(|p| &p.instance.part), &cur.part)),
        ..Default::default()
    };
    if let Some(started) = part_last_started {
        current_enable.start = Some(EnableValue::Time(started));
    }
    let current_group = create_part_group(cur, current_enable);

    let mut allow_transition = false;
    if let Some(prev) = previous {
        let prev_instance = &prev.instance;
        allow_transition = !prev_instance.part.disable_out_transition;

        if let Some(prev_started) = prev_instance.last_started_playback().filter(|s| *s != 0) {
            let end_offset = match prev_instance.part.autonext_overlap {
                Some(overlap) if prev_instance.part.autonext && overlap != 0 => overlap,
                _ => part_keepalive_duration(&prev_instance.part, &cur.part),
            };
            let mut prev_group = create_part_group(
                prev_instance,
                TimelineEnable {
                    start: Some(EnableValue::Time(prev_started)),
                    end: Some(reference(&current_group.id, Edge::Start, Some(end_offset))),
                    ..Default::default()
                },
            );
            prev_group.priority = -1.0;

            let prev_pieces: Vec<PieceInstanceWithTimings> =
                process_and_prune_piece_instance_timings(&prev_instance.part.id, prev.pieces.clone())
                    .into_iter()
                    .filter(|p| {
                        p.instance
                            .infinite_piece_id()
                            .is_none_or(|id| !current_infinite_ids.contains(id))
                    })
                    .collect();

            let transform = PartTransform {
                playlist_id: &playlist.id,
                part_id: &prev_instance.part.id,
                first_object_classes: vec!["previous_part".to_string()],
                part_group_id: &prev_group.id,
                now_in_part: now - prev_started,
                is_absolute_infinite_group: false,
                transition: None,
                hold_state: Some(playlist.hold_state),
                show_hold_except: false,
            };
            let mut prev_objects = transform_part_into_timeline(&prev_pieces, &transform);
            prev_objects.insert(0, prev_group);
            prefix_all_object_ids(&mut prev_objects, "previous_");
            objects.extend(prev_objects);
        }
    }

    let next_infinites: BTreeMap<&str, _> = match next {
        Some(n) if cur.part.autonext => n
            .pieces
            .iter()
            .filter_map(|p| p.infinite_piece_id().map(|id| (id, p)))
            .collect(),
        _ => BTreeMap::new(),
    };
    let previous_infinites: HashSet<&str> = previous
        .map(|p| p.pieces.iter().filter_map(|pi| pi.infinite_piece_id()).collect())
        .unwrap_or_default();

    for piece in &infinites {
        let Some(infinite_id) = piece.instance.infinite_piece_id() else {
            continue;
        };

        let mut group = create_part_group(
            cur,
            TimelineEnable {
                start: Some(reference(&current_group.id, Edge::Start, None)),
                duration: piece.instance.piece.enable.duration.filter(|d| *d != 0),
                ..Default::default()
            },
        );
        group.id = format!("{}_infinite", part_group_id(&piece.instance.id));
        group.priority = 1.0;

        let mut classes = vec!["current_part".to_string()];
        if previous_infinites.contains(infinite_id) {
            classes.push("continues_infinite".to_string());
        }

        let mut now_in_parent = now_in_part;
        let mut is_absolute = false;
        if let Some(started) = piece.instance.started_playback {
            // Un infini déjà à l'antenne garde son heure de départ
            group.enable = TimelineEnable::start_at(started);
            now_in_parent = now - started;
            is_absolute = true;
            if let Some(ud) = piece.instance.user_duration {
                group.enable.duration = Some(ud.end);
            }
        }

        let in_next = next_infinites.get(infinite_id);
        if let Some(in_next) = in_next {
            if !group.enable.has_duration_or_end() && in_next.piece.enable.duration.is_some() {
                group.enable.duration = in_next.piece.enable.duration;
            }
        }
        if is_followed && group.enable.duration.is_none() && in_next.is_none() {
            group.enable.end = Some(reference(&current_group.id, Edge::End, None));
        }

        let transform = PartTransform {
            playlist_id: &playlist.id,
            part_id: &cur.part.id,
            first_object_classes: classes,
            part_group_id: &group.id,
            now_in_part: now_in_parent,
            is_absolute_infinite_group: is_absolute,
            transition: None,
            hold_state: Some(playlist.hold_state),
            show_hold_except: piece.instance.piece.start_part_id != cur.part.id,
        };
        let piece_objects = transform_part_into_timeline(std::slice::from_ref(piece), &transform);
        objects.push(group);
        objects.extend(piece_objects);
    }

    let transform = PartTransform {
        playlist_id: &playlist.id,
        part_id: &cur.part.id,
        first_object_classes: vec!["current_part".to_string()],
        part_group_id: &current_group.id,
        now_in_part,
        is_absolute_infinite_group: false,
        transition: Some(TransitionProps::for_part(cur, allow_transition)),
        hold_state: Some(playlist.hold_state),
        show_hold_except: false,
    };
    let current_objects = transform_part_into_timeline(&normals, &transform);
    let first_object = create_part_group_first_object(
        &playlist.id,
        cur,
        &current_group.id,
        previous.map(|p| &p.instance),
    );
    let current_group_id = current_group.id.clone();
    objects.push(current_group);
    objects.push(first_object);
    objects.extend(current_objects);

    let Some(next) = next.filter(|_| cur.part.autonext) else {
        return;
    };
    let next_instance = &next.instance;
    let overlap = part_overlap_duration(&cur.part, &next_instance.part);
    let next_group = create_part_group(
        next_instance,
        TimelineEnable {
            start: Some(reference_minus(&current_group_id, Edge::End, overlap)),
            ..Default::default()
        },
    );

    let next_pieces: Vec<PieceInstanceWithTimings> =
        process_and_prune_piece_instance_timings(&next_instance.part.id, next.pieces.clone())
            .into_iter()
            .filter(|p| {
                p.instance
                    .infinite_piece_id()
                    .is_none_or(|id| !current_infinite_ids.contains(id))
            })
            .collect();

    let transform = PartTransform {
        playlist_id: &playlist.id,
        part_id: &next_instance.part.id,
        first_object_classes: vec!["next_part".to_string()],
        part_group_id: &next_group.id,
        now_in_part: 0,
        is_absolute_infinite_group: false,
        transition: Some(TransitionProps::for_part(next_instance, !cur.part.disable_out_transition)),
        hold_state: None,
        show_hold_except: false,
    };
    let next_objects = transform_part_into_timeline(&next_pieces, &transform);
    let first_object =
        create_part_group_first_object(&playlist.id, next_instance, &next_group.id, Some(cur));
    objects.push(next_group);
    objects.push(first_object);
    objects.extend(next_objects);
}
