//! Modifications d'ingest : insertion, remplacement, déplacement, échange de parts

use super::PlayoutContext;
use super::instances::{select_and_set_next, set_next_part_inner};
use super::{ordered_parts, select_next_part};
use crate::cache::CacheForPlayout;
use crate::lock::OperationPriority;
use crate::model::{Part, Piece};
use crate::rank::{
    PartRankInfo, RankedItem, ranks_for_insert, ranks_for_move, ranks_for_replace, swap_ranks,
    thread_dynamic_parts,
};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Part reçu de l'ingest, avec ses pieces
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPart {
    pub part: Part,
    pub pieces: Vec<Piece>,
}

/// Parts fixes d'un segment, triés par rang
fn fixed_siblings(cache: &CacheForPlayout, segment_id: &str) -> Vec<RankedItem> {
    let mut siblings: Vec<RankedItem> = cache
        .parts
        .find(|p| p.segment_id == segment_id && p.dynamically_inserted_after_part_id.is_none())
        .into_iter()
        .map(|p| RankedItem::new(p.id.clone(), p.rank))
        .collect();
    siblings.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
    siblings
}

fn segment_of(cache: &CacheForPlayout, part_id: &str) -> Result<String> {
    cache
        .parts
        .find_one(part_id)
        .map(|p| p.segment_id.clone())
        .ok_or_else(|| Error::not_found("Part", part_id))
}

/// Re-chaîne les parts dynamiques d'un segment derrière leur ancre
///
/// Un part dont l'ancre a disparu est marqué invalide.
pub(crate) fn update_part_ranks_in_segment(cache: &mut CacheForPlayout, segment_id: &str) -> Result<()> {
    let mut infos: Vec<PartRankInfo> = cache
        .parts
        .find(|p| p.segment_id == segment_id)
        .into_iter()
        .map(|p| PartRankInfo {
            id: p.id.clone(),
            rank: p.rank,
            dynamically_inserted_after: p.dynamically_inserted_after_part_id.clone(),
        })
        .collect();
    infos.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));

    let threading = thread_dynamic_parts(&infos);
    for update in &threading.updates {
        cache.parts.update(&update.id, |p| p.rank = update.rank)?;
    }
    for orphan in &threading.orphans {
        warn!(part_id = %orphan, segment_id, "Dynamic part lost its anchor, marked invalid");
        cache.parts.update(orphan, |p| p.invalid = true)?;
    }
    debug!(
        segment_id,
        updated = threading.updates.len(),
        orphans = threading.orphans.len(),
        "Part ranks updated"
    );
    Ok(())
}

/// Après une modification d'ingest, remplace le next s'il ne correspond plus
/// au part qui suit le current, puis régénère le timeline
fn after_ingest_change(cache: &mut CacheForPlayout, ctx: &PlayoutContext) -> Result<()> {
    if !cache.playlist.is_active() {
        return Ok(());
    }
    let next_taken = cache.next_part_instance().is_some_and(|n| n.is_taken);
    if !next_taken {
        let parts = ordered_parts(cache);
        let expected = select_next_part(cache.current_part_instance(), &parts).map(|s| s.part.clone());
        let actual = cache.next_part_instance().map(|n| n.part.clone());

        let unchanged = match (&expected, &actual) {
            (Some(e), Some(a)) => e == a,
            (None, None) => true,
            _ => false,
        };
        // un next choisi manuellement reste en place tant que son part existe et n'a pas changé
        let manual_still_valid = actual
            .as_ref()
            .is_some_and(|a| cache.parts.find_one(&a.id).is_some_and(|p| p == a && p.is_playable()));
        if !unchanged && !manual_still_valid {
            if expected.is_some() {
                select_and_set_next(cache)?;
            } else {
                set_next_part_inner(cache, None)?;
            }
        }
    }
    ctx.update_timeline(cache, None)
}

fn insert_ingest_parts(cache: &mut CacheForPlayout, parts: Vec<IngestPart>, ranks: Vec<f64>) -> Result<()> {
    for (ingest, rank) in parts.into_iter().zip(ranks) {
        let mut part = ingest.part;
        part.rank = rank;
        for mut piece in ingest.pieces {
            piece.start_part_id = part.id.clone();
            piece.rundown_id = part.rundown_id.clone();
            cache.pieces.replace(piece)?;
        }
        cache.parts.insert(part)?;
    }
    Ok(())
}

/// Insère des parts dans un segment, avant `before_part_id` (en fin si `None`)
pub async fn insert_parts(
    ctx: &PlayoutContext,
    playlist_id: &str,
    segment_id: &str,
    before_part_id: Option<&str>,
    parts: Vec<IngestPart>,
) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::Ingest, move |cache, ctx| {
        let siblings = fixed_siblings(cache, segment_id);
        let ranks = ranks_for_insert(&siblings, before_part_id, parts.len())?;
        let count = parts.len();
        for p in &parts {
            if p.part.segment_id != segment_id {
                return Err(Error::invariant(format!(
                    "Part {} belongs to segment {}, not {}",
                    p.part.id, p.part.segment_id, segment_id
                )));
            }
        }
        insert_ingest_parts(cache, parts, ranks)?;
        update_part_ranks_in_segment(cache, segment_id)?;
        info!(segment_id, count, "Parts inserted");
        after_ingest_change(cache, ctx)
    })
    .await
}

/// Remplace un part (et ses pieces) par de nouveaux parts, à sa place
pub async fn replace_part(
    ctx: &PlayoutContext,
    playlist_id: &str,
    replaced_part_id: &str,
    parts: Vec<IngestPart>,
) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::Ingest, move |cache, ctx| {
        let segment_id = segment_of(cache, replaced_part_id)?;
        let siblings = fixed_siblings(cache, &segment_id);
        let ranks = ranks_for_replace(&siblings, replaced_part_id, parts.len())?;

        cache.parts.remove(replaced_part_id)?;
        let removed_pieces = cache.pieces.remove_where(|p| p.start_part_id == replaced_part_id)?;
        insert_ingest_parts(cache, parts, ranks)?;
        update_part_ranks_in_segment(cache, &segment_id)?;
        info!(replaced_part_id, removed_pieces, "Part replaced");
        after_ingest_change(cache, ctx)
    })
    .await
}

/// Déplace des parts, dans l'ordre donné, avant `before_part_id`
pub async fn move_parts(
    ctx: &PlayoutContext,
    playlist_id: &str,
    moved_part_ids: Vec<String>,
    before_part_id: &str,
) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::Ingest, move |cache, ctx| {
        let segment_id = segment_of(cache, before_part_id)?;
        let siblings = fixed_siblings(cache, &segment_id);
        let moves = ranks_for_move(&siblings, &moved_part_ids, before_part_id)?;
        for item in &moves {
            cache.parts.update(&item.id, |p| p.rank = item.rank)?;
        }
        update_part_ranks_in_segment(cache, &segment_id)?;
        info!(moved = moves.len(), before_part_id, "Parts moved");
        after_ingest_change(cache, ctx)
    })
    .await
}

/// Échange les rangs de deux parts d'un même segment
pub async fn swap_parts(ctx: &PlayoutContext, playlist_id: &str, a: &str, b: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::Ingest, move |cache, ctx| {
        let segment_id = segment_of(cache, a)?;
        if segment_of(cache, b)? != segment_id {
            return Err(Error::invariant(format!("Parts {} and {} are not in the same segment", a, b)));
        }
        let siblings = fixed_siblings(cache, &segment_id);
        for item in swap_ranks(&siblings, a, b)? {
            cache.parts.update(&item.id, |p| p.rank = item.rank)?;
        }
        update_part_ranks_in_segment(cache, &segment_id)?;
        after_ingest_change(cache, ctx)
    })
    .await
}

/// Recalcule les rangs des parts dynamiques d'un segment
pub async fn update_part_ranks(ctx: &PlayoutContext, playlist_id: &str, segment_id: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::Ingest, move |cache, ctx| {
        update_part_ranks_in_segment(cache, segment_id)?;
        after_ingest_change(cache, ctx)
    })
    .await
}
