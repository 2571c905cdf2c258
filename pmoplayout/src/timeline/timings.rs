//! Calcul des durées de transition entre deux parts (millisecondes)

use crate::model::Part;

fn positive(v: Option<i64>) -> Option<i64> {
    v.filter(|x| *x != 0)
}

/// Durée pendant laquelle `from` reste visible après le début de `to`
pub fn part_keepalive_duration(from: &Part, to: &Part) -> i64 {
    if from.disable_out_transition {
        return from.autonext_overlap.unwrap_or(0);
    }
    match to.transition_keepalive_duration {
        None => to.preroll_duration.unwrap_or(0),
        Some(keepalive) => {
            let piece_delay =
                (to.preroll_duration.unwrap_or(0) - to.transition_preroll_duration.unwrap_or(0)).max(0);
            piece_delay + keepalive
        }
    }
}

/// Durée du groupe d'un part suivi d'un autonext
///
/// La durée attendue est corrigée de l'asymétrie preroll / keepalive entre
/// transition et cut franc.
pub fn part_target_duration(previous: Option<&Part>, current: &Part) -> i64 {
    let Some(expected) = current.expected_duration else {
        return 0;
    };
    let preroll = current.preroll_duration.unwrap_or(0);
    let max_preroll = positive(current.transition_preroll_duration).unwrap_or(0).max(preroll);
    let max_keepalive = positive(current.transition_keepalive_duration).unwrap_or(0).max(preroll);
    let raw = expected - (max_preroll - max_keepalive) + current.autonext_overlap.unwrap_or(0);

    match previous {
        Some(prev) if !prev.disable_out_transition => {
            raw + positive(current.transition_preroll_duration)
                .or(positive(current.preroll_duration))
                .unwrap_or(0)
        }
        _ => raw + preroll,
    }
}

/// Recouvrement entre la fin de `from` et le début de `to`
pub fn part_overlap_duration(from: &Part, to: &Part) -> i64 {
    let mut overlap = to.preroll_duration.unwrap_or(0);
    if !from.disable_out_transition && positive(to.transition_preroll_duration).is_some() {
        overlap = part_keepalive_duration(from, to);
    }
    if from.autonext {
        overlap += from.autonext_overlap.unwrap_or(0);
    }
    overlap
}
