//! Groupes de pieces, plafonnement et objets de rappel

use crate::model::{
    EnableValue, Piece, PieceInstance, TimelineEnable, TimelineObject,
};
use serde_json::json;
use std::collections::BTreeMap;

/// Marge au-delà de laquelle un piece terminé n'émet plus son contenu
pub const DEFINITELY_ENDED_FUTURE_DURATION: i64 = 1000;

pub fn piece_group_id(piece_instance_id: &str) -> String {
    format!("piece_group_{}", piece_instance_id)
}

pub fn piece_first_object_id(piece_instance_id: &str) -> String {
    format!("piece_group_firstobject_{}", piece_instance_id)
}

/// PieceInstance avec la fin imposée par un piece ultérieur de la même couche source
#[derive(Debug, Clone, PartialEq)]
pub struct PieceInstanceWithTimings {
    pub instance: PieceInstance,
    pub resolved_end_cap: Option<i64>,
}

fn order_key(p: &PieceInstance, part_id: &str) -> (i64, bool, String) {
    // à start égal, une continuation passe avant le piece propre au part
    (p.piece.enable.start, !p.is_infinite_continuation(part_id), p.id.clone())
}

/// Trie les pieces d'un part et plafonne chacun par le suivant sur sa couche source
///
/// Deux pieces de même couche au même start : seul le dernier est conservé.
pub fn process_and_prune_piece_instance_timings(
    part_id: &str,
    pieces: Vec<PieceInstance>,
) -> Vec<PieceInstanceWithTimings> {
    let mut pieces = pieces;
    pieces.sort_by_key(|p| order_key(p, part_id));

    let mut by_layer: BTreeMap<String, Vec<PieceInstance>> = BTreeMap::new();
    for p in pieces {
        by_layer.entry(p.piece.source_layer_id.clone()).or_default().push(p);
    }

    let mut result = Vec::new();
    for (_, layer_pieces) in by_layer {
        let mut kept: Vec<PieceInstanceWithTimings> = Vec::new();
        for p in layer_pieces {
            if let Some(last) = kept.last_mut() {
                if last.instance.piece.enable.start == p.piece.enable.start {
                    kept.pop();
                } else {
                    last.resolved_end_cap = Some(p.piece.enable.start);
                }
            }
            kept.push(PieceInstanceWithTimings {
                instance: p,
                resolved_end_cap: None,
            });
        }
        result.extend(kept);
    }
    result.sort_by_key(|p| order_key(&p.instance, part_id));
    result
}

/// Vrai si le piece s'est terminé plus d'une seconde avant `now_in_part`
pub fn has_definitely_ended(piece: &PieceInstanceWithTimings, now_in_part: i64) -> bool {
    if now_in_part <= 0 {
        return false;
    }
    let enable = &piece.instance.piece.enable;
    let relative_end = [
        piece.resolved_end_cap,
        piece.instance.user_duration.map(|u| u.end),
        enable.duration.map(|d| enable.start + d),
    ]
    .into_iter()
    .flatten()
    .min();

    relative_end.is_some_and(|end| end + DEFINITELY_ENDED_FUTURE_DURATION < now_in_part)
}

/// Groupe du piece, éventuellement enveloppé dans un groupe de plafonnement
pub fn create_piece_group_and_cap(
    piece: &PieceInstanceWithTimings,
    part_group_id: &str,
    enable: TimelineEnable,
) -> (TimelineObject, Vec<TimelineObject>) {
    let instance = &piece.instance;
    let mut group = TimelineObject::new(
        piece_group_id(&instance.id),
        instance.piece.source_layer_id.clone(),
        enable,
    )
    .with_content(json!({"deviceType": "abstract", "type": "group"}));
    group.is_group = true;
    group.priority = 5.0;
    group.in_group = Some(part_group_id.to_string());
    group.metadata = Some(json!({"pieceId": instance.piece.id}));
    group.piece_instance_id = Some(instance.id.clone());
    group.infinite_piece_id = instance.infinite_piece_id().map(str::to_string);

    let mut caps = Vec::new();
    if let Some(cap) = piece.resolved_end_cap {
        let mut cap_group = TimelineObject::new(
            format!("{}_cap", piece_group_id(&instance.id)),
            "",
            TimelineEnable {
                start: Some(EnableValue::Time(0)),
                end: Some(EnableValue::Time(cap)),
                ..Default::default()
            },
        )
        .with_content(json!({"deviceType": "abstract", "type": "group"}));
        cap_group.is_group = true;
        cap_group.in_group = Some(part_group_id.to_string());
        group.in_group = Some(cap_group.id.clone());
        caps.push(cap_group);
    }
    (group, caps)
}

/// Objet abstrait dont le démarrage signale `piecePlaybackStarted`
pub fn create_piece_group_first_object(
    playlist_id: &str,
    instance: &PieceInstance,
    piece_group_id: &str,
    classes: &[String],
) -> TimelineObject {
    let mut obj = TimelineObject::new(
        piece_first_object_id(&instance.id),
        format!("{}_firstobject", instance.piece.source_layer_id),
        TimelineEnable::start_at(0i64),
    )
    .with_content(json!({
        "deviceType": "abstract",
        "type": "callback",
        "callBack": "piecePlaybackStarted",
        "callBackData": {
            "rundownPlaylistId": playlist_id,
            "pieceInstanceId": instance.id,
            "dynamicallyInserted": instance.dynamically_inserted,
        },
        "callBackStopped": "piecePlaybackStopped",
    }))
    .with_classes(classes.to_vec());
    obj.in_group = Some(piece_group_id.to_string());
    obj.piece_instance_id = Some(instance.id.clone());
    obj.infinite_piece_id = instance.infinite_piece_id().map(str::to_string);
    obj
}

/// Ordre de résolution des pieces d'un part : par start, transition d'abord
pub fn order_pieces<'a>(pieces: impl IntoIterator<Item = &'a Piece>) -> Vec<&'a Piece> {
    let mut ordered: Vec<&Piece> = pieces.into_iter().collect();
    ordered.sort_by(|a, b| {
        a.enable
            .start
            .cmp(&b.enable.start)
            .then_with(|| b.is_transition.cmp(&a.is_transition))
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}
