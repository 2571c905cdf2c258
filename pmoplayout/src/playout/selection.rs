//! Ordre des parts et choix du part suivant

use crate::cache::CacheForPlayout;
use crate::model::{Part, PartInstance};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Parts du playlist triés par (rang du rundown, rang du segment, rang du part)
///
/// Un part dont le segment est introuvable est placé en fin de son rundown.
pub fn ordered_parts(cache: &CacheForPlayout) -> Vec<Part> {
    let rundown_ranks: HashMap<&str, f64> = cache.rundowns.iter().map(|r| (r.id.as_str(), r.rank)).collect();
    let segment_ranks: HashMap<&str, f64> = cache.segments.iter().map(|s| (s.id.as_str(), s.rank)).collect();

    let key = |p: &Part| {
        (
            rundown_ranks.get(p.rundown_id.as_str()).copied().unwrap_or(f64::MAX),
            segment_ranks.get(p.segment_id.as_str()).copied().unwrap_or(f64::MAX),
            p.rank,
        )
    };

    let mut parts: Vec<Part> = cache.parts.iter().cloned().collect();
    parts.sort_by(|a, b| {
        let (ka, kb) = (key(a), key(b));
        ka.0.total_cmp(&kb.0)
            .then_with(|| ka.1.total_cmp(&kb.1))
            .then_with(|| ka.2.total_cmp(&kb.2))
            .then_with(|| a.id.cmp(&b.id))
    });
    parts
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedNextPart<'a> {
    /// Position dans la liste ordonnée
    pub index: usize,
    pub part: &'a Part,
}

/// Premier part jouable après `previous` (ou depuis le début)
///
/// Si le part de `previous` a disparu de la liste, la recherche reprend au
/// premier part de son segment dont le rang est supérieur.
pub fn select_next_part<'a>(
    previous: Option<&PartInstance>,
    ordered_parts: &'a [Part],
) -> Option<SelectedNextPart<'a>> {
    let start = match previous {
        None => 0,
        Some(instance) => match ordered_parts.iter().position(|p| p.id == instance.part.id) {
            Some(idx) => idx + 1,
            None => ordered_parts.iter().position(|p| {
                p.segment_id == instance.segment_id
                    && p.rank.partial_cmp(&instance.part.rank) == Some(Ordering::Greater)
            })?,
        },
    };

    ordered_parts
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, p)| p.is_playable())
        .map(|(index, part)| SelectedNextPart { index, part })
}
