//! Ad-libs : parts insérés en direct et arrêt de couches sources

use super::PlayoutContext;
use super::ingest::update_part_ranks_in_segment;
use super::instances::{require_active, set_next_part_inner};
use crate::lock::OperationPriority;
use crate::model::{HoldState, Part, Piece, UserDuration};
use crate::rank::get_rank;
use crate::{Error, Result};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Part ad-lib à insérer derrière le part current
#[derive(Debug, Clone, PartialEq)]
pub struct AdLibPart {
    pub title: String,
    pub expected_duration: Option<i64>,
    pub autonext: bool,
    /// Pieces du part ; identifiants, rundown et part de départ sont réattribués
    pub pieces: Vec<Piece>,
}

/// Insère un part dynamique juste après le current et le prépare en next
///
/// Retourne l'identifiant du part créé.
pub async fn queue_adlib_part(ctx: &PlayoutContext, playlist_id: &str, adlib: AdLibPart) -> Result<String> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, move |cache, ctx| {
        require_active(cache)?;
        if cache.playlist.hold_state != HoldState::Inactive {
            return Err(Error::invalid_state("Cannot queue an ad-lib part during a hold"));
        }
        let current = cache
            .current_part_instance()
            .cloned()
            .ok_or_else(|| Error::invalid_state("Cannot queue an ad-lib part without a current part"))?;

        let following_rank = cache
            .parts
            .find(|p| p.segment_id == current.segment_id && p.rank > current.part.rank)
            .into_iter()
            .map(|p| p.rank)
            .min_by(f64::total_cmp);

        let mut part = Part::new(
            format!("adlib_{}", Uuid::new_v4().simple()),
            current.rundown_id.clone(),
            current.segment_id.clone(),
            get_rank(Some(current.part.rank), following_rank, 0, 1),
        );
        part.title = adlib.title;
        part.expected_duration = adlib.expected_duration;
        part.autonext = adlib.autonext;
        part.dynamically_inserted_after_part_id = Some(current.part.id.clone());
        let part_id = part.id.clone();

        for (i, mut piece) in adlib.pieces.into_iter().enumerate() {
            piece.id = format!("{}_piece{}", part_id, i);
            piece.rundown_id = part.rundown_id.clone();
            piece.start_part_id = part_id.clone();
            cache.pieces.insert(piece)?;
        }
        cache.parts.insert(part)?;
        update_part_ranks_in_segment(cache, &current.segment_id)?;

        let part = cache
            .parts
            .find_one(&part_id)
            .cloned()
            .ok_or_else(|| Error::invariant(format!("Ad-lib part {} vanished after ranking", part_id)))?;
        set_next_part_inner(cache, Some(part))?;
        info!(part_id = %part_id, after = %current.part.id, "Ad-lib part queued");
        ctx.update_timeline(cache, None)?;
        Ok(part_id)
    })
    .await
}

/// Arrête, à `stop_at`, les pieces du part current posés sur ces couches sources
///
/// Les pieces qui n'ont pas encore commencé sont désactivés. Retourne le
/// nombre de pieces touchés.
pub async fn stop_pieces_on_source_layers(
    ctx: &PlayoutContext,
    playlist_id: &str,
    source_layer_ids: Vec<String>,
    stop_at: i64,
) -> Result<usize> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, move |cache, ctx| {
        require_active(cache)?;
        let current = cache
            .current_part_instance()
            .cloned()
            .ok_or_else(|| Error::invalid_state("No current part"))?;
        let part_start = current
            .timings
            .started_playback
            .ok_or_else(|| Error::invalid_state("Current part has not started playback"))?;
        let layers: HashSet<String> = source_layer_ids.into_iter().collect();
        let offset = stop_at - part_start;

        let stopped = cache.piece_instances.update_where(
            |p| {
                p.part_instance_id == current.id
                    && !p.reset
                    && !p.disabled
                    && p.user_duration.is_none()
                    && layers.contains(&p.piece.source_layer_id)
            },
            |p| {
                // un infini déjà lancé est mesuré depuis son propre départ
                let end = match (p.infinite.is_some(), p.started_playback) {
                    (true, Some(started)) => stop_at - started,
                    _ if p.piece.enable.start > offset => {
                        p.disabled = true;
                        return;
                    }
                    _ => offset,
                };
                p.user_duration = Some(UserDuration { end: end.max(0) });
            },
        )?;

        info!(stopped, layers = ?layers, "Pieces stopped on source layers");
        if stopped > 0 {
            ctx.update_timeline(cache, None)?;
        }
        Ok(stopped)
    })
    .await
}
