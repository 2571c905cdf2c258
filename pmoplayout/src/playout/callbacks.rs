//! Rappels des périphériques : lecture démarrée

use super::PlayoutContext;
use super::instances::require_active;
use super::take::take_next_part_inner;
use crate::lock::OperationPriority;
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Un part a démarré sur les périphériques
///
/// Si c'est le part next (autonext), il est pris et les starts `"now"`
/// sont fixés à `started_at`. Si c'est le current, son heure de départ est
/// enregistrée.
pub async fn on_part_playback_started(
    ctx: &PlayoutContext,
    playlist_id: &str,
    part_instance_id: &str,
    started_at: i64,
) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::CallbackPlayout, |cache, ctx| {
        require_active(cache)?;
        let instance = cache
            .part_instances
            .find_one(part_instance_id)
            .ok_or_else(|| Error::not_found("PartInstance", part_instance_id))?;
        if instance.timings.started_playback == Some(started_at) {
            debug!(part_instance_id, "Playback start already recorded");
            return Ok(());
        }

        let is_current = cache.playlist.current_part_instance_id.as_deref() == Some(part_instance_id);
        let is_next = cache.playlist.next_part_instance_id.as_deref() == Some(part_instance_id);

        if is_next {
            info!(part_instance_id, started_at, "Next part started playback, taking it");
            take_next_part_inner(cache, started_at)?;
            cache
                .part_instances
                .update(part_instance_id, |pi| pi.timings.started_playback = Some(started_at))?;
            return ctx.update_timeline(cache, Some(started_at));
        }

        cache
            .part_instances
            .update(part_instance_id, |pi| pi.timings.started_playback = Some(started_at))?;
        if is_current {
            ctx.update_timeline(cache, None)
        } else {
            warn!(part_instance_id, "Playback started for a part that is neither current nor next");
            Ok(())
        }
    })
    .await
}

/// Un piece a démarré ; l'heure est enregistrée sans régénérer le timeline
pub async fn on_piece_playback_started(
    ctx: &PlayoutContext,
    playlist_id: &str,
    piece_instance_id: &str,
    started_at: i64,
) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::CallbackPlayout, |cache, _ctx| {
        require_active(cache)?;
        let piece = cache
            .piece_instances
            .find_one(piece_instance_id)
            .ok_or_else(|| Error::not_found("PieceInstance", piece_instance_id))?;
        if piece.started_playback.is_some() {
            return Ok(());
        }
        cache
            .piece_instances
            .update(piece_instance_id, |p| p.started_playback = Some(started_at))?;
        debug!(piece_instance_id, started_at, "Piece playback started");
        Ok(())
    })
    .await
}
