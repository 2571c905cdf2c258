//! Allocation de rangs fractionnaires
//!
//! Les rangs (`_rank`) sont des flottants strictement ordonnés au sein d'une
//! liste de frères. Insérer `count` éléments entre deux voisins subdivise
//! linéairement l'intervalle qui les sépare.

use crate::{Error, Result};

/// Rang du `i`-ème élément parmi `count` insérés entre `before` et `after`
///
/// - sans prédécesseur, la borne basse est `after - 1`
/// - sans successeur, la borne haute est `before + 1`
/// - liste vide : intervalle `[0, 1)`
pub fn get_rank(before: Option<f64>, after: Option<f64>, i: usize, count: usize) -> f64 {
    let (min, max) = match (before, after) {
        (Some(b), Some(a)) => (b, a),
        (None, Some(a)) => (a - 1.0, a),
        (Some(b), None) => (b, b + 1.0),
        (None, None) => (0.0, 1.0),
    };
    min + ((i + 1) as f64 / (count + 1) as f64) * (max - min)
}

/// Élément d'une liste de frères triée par rang
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub id: String,
    pub rank: f64,
}

impl RankedItem {
    pub fn new(id: impl Into<String>, rank: f64) -> Self {
        Self {
            id: id.into(),
            rank,
        }
    }
}

fn position(siblings: &[RankedItem], id: &str) -> Result<usize> {
    siblings
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| Error::not_found("RankedItem", id))
}

/// Rangs pour `count` éléments insérés avant `before_id` (en fin si `None`)
pub fn ranks_for_insert(
    siblings: &[RankedItem],
    before_id: Option<&str>,
    count: usize,
) -> Result<Vec<f64>> {
    let (prev, next) = match before_id {
        Some(id) => {
            let idx = position(siblings, id)?;
            let prev = idx.checked_sub(1).map(|i| siblings[i].rank);
            (prev, Some(siblings[idx].rank))
        }
        None => (siblings.last().map(|s| s.rank), None),
    };
    Ok((0..count).map(|i| get_rank(prev, next, i, count)).collect())
}

/// Rangs pour `count` éléments remplaçant `replaced_id` entre ses voisins
pub fn ranks_for_replace(siblings: &[RankedItem], replaced_id: &str, count: usize) -> Result<Vec<f64>> {
    let idx = position(siblings, replaced_id)?;
    let prev = idx.checked_sub(1).map(|i| siblings[i].rank);
    let next = siblings.get(idx + 1).map(|s| s.rank);
    Ok((0..count).map(|i| get_rank(prev, next, i, count)).collect())
}

/// Nouveaux rangs des éléments `moved_ids` déplacés, dans cet ordre, avant `before_id`
pub fn ranks_for_move(
    siblings: &[RankedItem],
    moved_ids: &[String],
    before_id: &str,
) -> Result<Vec<RankedItem>> {
    if moved_ids.iter().any(|id| id == before_id) {
        return Err(Error::invariant(format!(
            "Cannot move {} before itself",
            before_id
        )));
    }
    for id in moved_ids {
        position(siblings, id)?;
    }

    let remaining: Vec<&RankedItem> = siblings
        .iter()
        .filter(|s| !moved_ids.contains(&s.id))
        .collect();
    let idx = remaining
        .iter()
        .position(|s| s.id == before_id)
        .ok_or_else(|| Error::not_found("RankedItem", before_id))?;
    let prev = idx.checked_sub(1).map(|i| remaining[i].rank);
    let next = Some(remaining[idx].rank);

    let count = moved_ids.len();
    Ok(moved_ids
        .iter()
        .enumerate()
        .map(|(i, id)| RankedItem::new(id.clone(), get_rank(prev, next, i, count)))
        .collect())
}

/// Échange les rangs de deux éléments
pub fn swap_ranks(siblings: &[RankedItem], a: &str, b: &str) -> Result<[RankedItem; 2]> {
    let ra = siblings[position(siblings, a)?].rank;
    let rb = siblings[position(siblings, b)?].rank;
    Ok([RankedItem::new(a, rb), RankedItem::new(b, ra)])
}

/// Part d'un segment vu par le re-chaînage des parts dynamiques
#[derive(Debug, Clone)]
pub struct PartRankInfo {
    pub id: String,
    pub rank: f64,
    pub dynamically_inserted_after: Option<String>,
}

/// Résultat du re-chaînage
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RankThreading {
    /// Parts dynamiques dont le rang change
    pub updates: Vec<RankedItem>,
    /// Parts dynamiques dont l'ancre est introuvable
    pub orphans: Vec<String>,
}

/// Re-chaîne les parts dynamiques derrière leur ancre puis les redistribue
/// uniformément entre les deux parts fixes qui les encadrent
///
/// `parts` doit être trié par rang.
pub fn thread_dynamic_parts(parts: &[PartRankInfo]) -> RankThreading {
    let (dynamic, mut sorted): (Vec<&PartRankInfo>, Vec<&PartRankInfo>) = parts
        .iter()
        .partition(|p| p.dynamically_inserted_after.is_some());

    let mut result = RankThreading::default();
    if dynamic.is_empty() {
        return result;
    }

    // Chaque passe accroche les parts dont l'ancre est déjà placée
    let mut remaining = dynamic;
    loop {
        let mut added = false;
        let mut still_remaining = Vec::new();
        for part in remaining {
            let anchor = part.dynamically_inserted_after.as_deref();
            match sorted.iter().position(|p| Some(p.id.as_str()) == anchor) {
                Some(idx) => {
                    sorted.insert(idx + 1, part);
                    added = true;
                }
                None => still_remaining.push(part),
            }
        }
        remaining = still_remaining;
        if !added || remaining.is_empty() {
            break;
        }
    }
    result.orphans = remaining.iter().map(|p| p.id.clone()).collect();

    let mut i = 0;
    while i + 1 < sorted.len() {
        let before_idx = i;
        let after_idx = sorted
            .iter()
            .enumerate()
            .skip(i + 1)
            .find(|(_, p)| p.dynamically_inserted_after.is_none())
            .map(|(idx, _)| idx);

        let last_dynamic = match after_idx {
            Some(a) if a == before_idx + 1 => {
                i += 1;
                continue;
            }
            Some(a) => {
                i = a;
                a - 1
            }
            None => {
                i = sorted.len();
                sorted.len() - 1
            }
        };

        let first_dynamic = before_idx + 1;
        let count = last_dynamic + 1 - first_dynamic;
        let base = sorted[before_idx].rank;
        let after = after_idx.map(|a| sorted[a].rank).unwrap_or(base + 1.0);
        let delta = (after - base) / (count as f64 + 1.0);

        let mut prev = base;
        for part in &sorted[first_dynamic..=last_dynamic] {
            prev += delta;
            if part.rank != prev {
                result.updates.push(RankedItem::new(part.id.clone(), prev));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(ranks: &[(&str, f64)]) -> Vec<RankedItem> {
        ranks.iter().map(|(id, r)| RankedItem::new(*id, *r)).collect()
    }

    #[test]
    fn test_get_rank_bounds() {
        assert_eq!(get_rank(None, None, 0, 1), 0.5);
        assert_eq!(get_rank(Some(1.0), Some(2.0), 0, 1), 1.5);
        assert_eq!(get_rank(None, Some(3.0), 0, 1), 2.5);
        assert_eq!(get_rank(Some(3.0), None, 0, 3), 3.25);
    }

    #[test]
    fn test_rank_density() {
        let count = 5000;
        let ranks: Vec<f64> = (0..count).map(|i| get_rank(Some(1.0), Some(2.0), i, count)).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
        assert!(ranks.iter().all(|r| *r > 1.0 && *r < 2.0));
    }

    #[test]
    fn test_insert_before_and_at_end() {
        let s = items(&[("a", 1.0), ("b", 2.0)]);
        let r = ranks_for_insert(&s, Some("b"), 2).unwrap();
        assert!(1.0 < r[0] && r[0] < r[1] && r[1] < 2.0);

        let r = ranks_for_insert(&s, None, 1).unwrap();
        assert_eq!(r, vec![2.5]);

        let r = ranks_for_insert(&s, Some("a"), 1).unwrap();
        assert_eq!(r, vec![0.5]);

        assert!(ranks_for_insert(&s, Some("zz"), 1).is_err());
    }

    #[test]
    fn test_replace_uses_neighbours() {
        let s = items(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let r = ranks_for_replace(&s, "b", 3).unwrap();
        assert_eq!(r.len(), 3);
        assert!(r.iter().all(|x| *x > 1.0 && *x < 3.0));
    }

    #[test]
    fn test_move_and_swap() {
        let s = items(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        let moved = ranks_for_move(&s, &["d".to_string(), "c".to_string()], "b").unwrap();
        assert_eq!(moved[0].id, "d");
        assert!(1.0 < moved[0].rank && moved[0].rank < moved[1].rank && moved[1].rank < 2.0);

        assert!(ranks_for_move(&s, &["b".to_string()], "b").is_err());

        let [x, y] = swap_ranks(&s, "a", "d").unwrap();
        assert_eq!((x.rank, y.rank), (4.0, 1.0));
    }

    fn info(id: &str, rank: f64, after: Option<&str>) -> PartRankInfo {
        PartRankInfo {
            id: id.into(),
            rank,
            dynamically_inserted_after: after.map(str::to_string),
        }
    }

    #[test]
    fn test_thread_dynamic_parts_between_anchors() {
        let parts = vec![
            info("p1", 1.0, None),
            info("p2", 2.0, None),
            info("adlib1", 9.0, Some("p1")),
            info("adlib2", 10.0, Some("adlib1")),
        ];
        let res = thread_dynamic_parts(&parts);
        assert!(res.orphans.is_empty());
        let rank_of = |id: &str| res.updates.iter().find(|u| u.id == id).unwrap().rank;
        let r1 = rank_of("adlib1");
        let r2 = rank_of("adlib2");
        assert!(1.0 < r1 && r1 < r2 && r2 < 2.0);
    }

    #[test]
    fn test_thread_dynamic_parts_after_last() {
        let parts = vec![info("p1", 1.0, None), info("x", 0.2, Some("p1"))];
        let res = thread_dynamic_parts(&parts);
        assert_eq!(res.updates, vec![RankedItem::new("x", 1.5)]);
    }

    #[test]
    fn test_unresolved_anchor_is_reported() {
        let parts = vec![
            info("p1", 1.0, None),
            info("lost", 1.5, Some("gone")),
            info("child", 1.6, Some("lost")),
        ];
        let res = thread_dynamic_parts(&parts);
        assert!(res.updates.is_empty());
        assert_eq!(res.orphans.len(), 2);
    }
}
