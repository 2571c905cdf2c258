//! Préchargement du contenu à venir, couche par couche
//!
//! Pour chaque mapping avec un mode de lookahead, deux familles d'objets :
//! - *timed* : le contenu des parts déjà sur le timeline (current, et next
//!   si current enchaîne en autonext), chaînés les uns aux autres ;
//! - *future* : le contenu des parts suivants, trouvé en avançant dans
//!   l'ordre du rundown.

use super::TimelineInput;
use super::pieces::order_pieces;
use crate::model::{
    EnableValue, LookaheadMode, Mapping, Part, PartInstance, Piece, PieceInstance, TimelineEnable,
    TimelineObject, TimelineObjectType,
};
use crate::playout::select_next_part;
use serde_json::Value;
use std::collections::HashMap;

pub const LOOKAHEAD_OBJ_PRIORITY: f64 = 0.1;

/// Délai ajouté derrière un objet portant la classe `_lookahead_start_delay`
const LOOKAHEAD_START_DELAY: i64 = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct LookaheadEntry {
    pub obj: TimelineObject,
    pub part_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookaheadResult {
    pub timed: Vec<LookaheadEntry>,
    pub future: Vec<LookaheadEntry>,
}

/// Part et ses pieces sur la couche, gabarits ou instances
struct PartAndPieces<'a> {
    part: &'a Part,
    pieces: Vec<&'a Piece>,
    /// Premier piece de transition du part, toutes couches confondues
    transition: Option<&'a Piece>,
}

fn first_transition<'a>(pieces: impl IntoIterator<Item = &'a Piece>) -> Option<&'a Piece> {
    order_pieces(pieces).into_iter().find(|p| p.is_transition)
}

struct InstanceOnTimeline<'a> {
    instance: &'a PartInstance,
    pieces: &'a [PieceInstance],
}

fn mutate_object(
    raw: &TimelineObject,
    key: &str,
    enable: TimelineEnable,
    mapping: &Mapping,
    priority: f64,
) -> TimelineObject {
    let mut obj = raw.clone();
    obj.id = format!("lookahead_{}_{}", key, raw.id);
    obj.priority = priority;
    obj.enable = enable;
    obj.is_lookahead = true;
    obj.keyframes.retain(|kf| kf.preserve_for_lookahead);
    obj.in_group = None;
    if mapping.lookahead == LookaheadMode::Preload {
        obj.lookahead_for_layer = Some(obj.layer.clone());
        obj.layer = format!("{}_lookahead", obj.layer);
    }
    obj
}

fn start_after(previous: &TimelineObject) -> TimelineEnable {
    let offset = if previous.has_class("_lookahead_start_delay") {
        LOOKAHEAD_START_DELAY
    } else {
        0
    };
    TimelineEnable::start_at(EnableValue::expr(format!("#{}.start + {}", previous.id, offset)))
}

/// Objets de lookahead de tous les mappings du studio
pub fn get_lookahead_objects(input: &TimelineInput) -> Vec<TimelineObject> {
    let mut on_timeline: Vec<InstanceOnTimeline<'_>> = Vec::new();
    if let Some(current) = &input.current {
        on_timeline.push(InstanceOnTimeline {
            instance: &current.instance,
            pieces: &current.pieces,
        });
        if current.instance.part.autonext {
            if let Some(next) = &input.next {
                on_timeline.push(InstanceOnTimeline {
                    instance: &next.instance,
                    pieces: &next.pieces,
                });
            }
        }
    }
    let previous = input.previous.as_ref().map(|p| InstanceOnTimeline {
        instance: &p.instance,
        pieces: &p.pieces,
    });

    let mut pieces_by_part: HashMap<&str, Vec<&Piece>> = HashMap::new();
    for piece in &input.pieces {
        pieces_by_part.entry(piece.start_part_id.as_str()).or_default().push(piece);
    }

    let mut objects = Vec::new();
    for (layer, mapping) in &input.studio.mappings {
        if mapping.lookahead == LookaheadMode::None {
            continue;
        }
        let result = find_lookahead_for_layer(
            input,
            &on_timeline,
            previous.as_ref(),
            &pieces_by_part,
            layer,
            mapping,
        );

        for (i, entry) in result.timed.iter().enumerate() {
            let mut enable = match i {
                0 => TimelineEnable::start_at(1i64),
                _ => start_after(&result.timed[i - 1].obj),
            };
            enable.end = Some(EnableValue::expr(format!("#{}.start", entry.obj.id)));
            objects.push(mutate_object(
                &entry.obj,
                &format!("timed{}", i),
                enable,
                mapping,
                LOOKAHEAD_OBJ_PRIORITY,
            ));
        }

        if mapping.lookahead == LookaheadMode::WhenClear {
            // Tous les futurs coexistent, le plus proche domine
            let count = result.future.len();
            let scale = LOOKAHEAD_OBJ_PRIORITY / (count as f64 + 1.0);
            for (i, entry) in result.future.iter().enumerate() {
                objects.push(mutate_object(
                    &entry.obj,
                    &format!("future{}", i),
                    TimelineEnable::while_(EnableValue::expr("1")),
                    mapping,
                    scale * (count - i) as f64,
                ));
            }
        } else if let Some(entry) = result.future.first() {
            let enable = match result.timed.last() {
                Some(last) => start_after(&last.obj),
                None => TimelineEnable::while_(EnableValue::expr("1")),
            };
            objects.push(mutate_object(&entry.obj, "future0", enable, mapping, LOOKAHEAD_OBJ_PRIORITY));
        }
    }
    objects
}

fn pieces_on_layer<'a>(pieces: &'a [PieceInstance], layer: &str) -> Vec<&'a Piece> {
    pieces
        .iter()
        .map(|p| &p.piece)
        .filter(|p| p.uses_layer(layer))
        .collect()
}

/// Recherche les objets timed et future d'une couche
fn find_lookahead_for_layer<'a>(
    input: &'a TimelineInput,
    on_timeline: &[InstanceOnTimeline<'a>],
    previous: Option<&InstanceOnTimeline<'a>>,
    pieces_by_part: &HashMap<&str, Vec<&'a Piece>>,
    layer: &str,
    mapping: &Mapping,
) -> LookaheadResult {
    let mut res = LookaheadResult::default();
    let has_current = input.playlist.current_part_instance_id.is_some();

    let mut previous_info = previous.map(|p| PartAndPieces {
        part: &p.instance.part,
        pieces: pieces_on_layer(p.pieces, layer),
        transition: first_transition(p.pieces.iter().map(|pi| &pi.piece)),
    });

    for entry in on_timeline {
        let info = PartAndPieces {
            part: &entry.instance.part,
            pieces: pieces_on_layer(entry.pieces, layer),
            transition: first_transition(entry.pieces.iter().map(|pi| &pi.piece)),
        };
        for obj in find_objects_for_part(layer, has_current, previous_info.as_ref(), &info, Some(entry.instance.id.as_str())) {
            res.timed.push(LookaheadEntry {
                obj,
                part_id: info.part.id.clone(),
            });
        }
        previous_info = Some(info);
    }

    if !input.pieces.iter().any(|p| p.uses_layer(layer)) {
        return res;
    }
    if mapping.lookahead_max_search_distance == Some(0) {
        return res;
    }

    let search_from = on_timeline.last().or(previous).map(|e| e.instance);
    let Some(start) = select_next_part(search_from, &input.ordered_parts) else {
        return res;
    };

    let target = mapping.lookahead_target_objects();
    let mut examined = 0;
    for part in input.ordered_parts[start.index..].iter().filter(|p| p.is_playable()) {
        if res.future.len() >= target {
            break;
        }
        if mapping.lookahead_max_search_distance.is_some_and(|max| examined >= max) {
            break;
        }
        examined += 1;

        let part_pieces = pieces_by_part.get(part.id.as_str()).map(Vec::as_slice).unwrap_or_default();
        let pieces: Vec<&Piece> = part_pieces.iter().copied().filter(|p| p.uses_layer(layer)).collect();
        if pieces.is_empty() {
            continue;
        }

        let info = PartAndPieces {
            part,
            pieces,
            transition: first_transition(part_pieces.iter().copied()),
        };
        // Chaque candidat du part est conservé
        for obj in find_objects_for_part(layer, has_current, previous_info.as_ref(), &info, None) {
            res.future.push(LookaheadEntry {
                obj,
                part_id: part.id.clone(),
            });
        }
        previous_info = Some(info);
    }
    res
}

fn merge_content(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut merged = b.clone();
            for (k, v) in o {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        _ => overlay.clone(),
    }
}

fn tag_object(obj: &TimelineObject, piece: &Piece, part_instance_id: Option<&str>) -> TimelineObject {
    let mut o = obj.clone();
    o.object_type = TimelineObjectType::Rundown;
    o.piece_instance_id = Some(match part_instance_id {
        Some(pi) => PieceInstance::id_for(pi, &piece.id),
        None => piece.id.clone(),
    });
    o
}

fn find_objects_for_part(
    layer: &str,
    playlist_has_current: bool,
    previous: Option<&PartAndPieces<'_>>,
    info: &PartAndPieces<'_>,
    part_instance_id: Option<&str>,
) -> Vec<TimelineObject> {
    let all: Vec<(&Piece, &TimelineObject)> = info
        .pieces
        .iter()
        .flat_map(|p| p.content.timeline_objects.iter().map(move |o| (*p, o)))
        .collect();
    match all.len() {
        0 => return Vec::new(),
        1 => return vec![tag_object(all[0].1, all[0].0, part_instance_id)],
        _ => {}
    }

    let (allow_transition, classes_from_previous) = match previous {
        Some(prev) if playlist_has_current => (
            !prev.part.disable_out_transition,
            prev.part.classes_for_next.as_slice(),
        ),
        _ => (false, &[][..]),
    };

    let ordered = order_pieces(info.pieces.iter().copied());
    let has_transition = allow_transition && info.transition.is_some_and(|t| t.uses_layer(layer));

    let mut res = Vec::new();
    for piece in ordered {
        if !allow_transition && piece.is_transition {
            continue;
        }
        // Avec une transition, le piece à 0 est le contenu principal, déjà couvert
        if has_transition && !piece.is_transition && piece.enable.start == 0 {
            continue;
        }
        let Some(obj) = piece.content.timeline_objects.iter().find(|o| o.layer == layer) else {
            continue;
        };

        let transition_kf = if allow_transition {
            let plain = EnableValue::expr(".is_transition");
            obj.keyframes
                .iter()
                .find(|kf| kf.enable.while_.as_ref() == Some(&plain))
                .or_else(|| {
                    obj.keyframes.iter().find(|kf| {
                        classes_from_previous.iter().any(|cl| {
                            kf.enable.while_.as_ref()
                                == Some(&EnableValue::expr(format!(".is_transition & .{}", cl)))
                        })
                    })
                })
        } else {
            None
        };

        let mut tagged = tag_object(obj, piece, part_instance_id);
        if let Some(kf) = transition_kf {
            tagged.content = merge_content(&obj.content, &kf.content);
        }
        res.push(tagged);
    }
    res
}
