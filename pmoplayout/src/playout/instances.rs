//! Création des PartInstances et continuation des pieces infinis

use super::{PlayoutContext, ordered_parts, select_next_part};
use crate::cache::CacheForPlayout;
use crate::lock::OperationPriority;
use crate::model::{
    HoldState, InfiniteInfo, Part, PartInstance, PartInstanceTimings, PieceInstance, PieceLifespan,
};
use crate::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) fn require_active(cache: &CacheForPlayout) -> Result<String> {
    cache
        .playlist
        .activation_id
        .clone()
        .ok_or_else(|| Error::invalid_state(format!("RundownPlaylist {} is not active", cache.playlist_id())))
}

/// Vrai si `piece` (infini de `from`) se prolonge dans `to`
fn continues_into(piece: &PieceInstance, from: &PartInstance, to: &Part) -> bool {
    if piece.reset || piece.disabled || piece.user_duration.is_some() || piece.stopped_playback.is_some() {
        return false;
    }
    match piece.piece.lifespan {
        PieceLifespan::WithinPart => false,
        PieceLifespan::OutOnSegmentEnd => from.segment_id == to.segment_id,
        PieceLifespan::OutOnRundownEnd => from.rundown_id == to.rundown_id,
    }
}

/// PieceInstances d'une nouvelle PartInstance : pieces propres au part, puis
/// infinis prolongés depuis `previous`
///
/// Un infini n'est pas prolongé si le part possède son propre piece sur la
/// même couche source, démarrant à 0.
pub(crate) fn piece_instances_for_new_part(
    cache: &CacheForPlayout,
    instance: &PartInstance,
    previous: Option<&PartInstance>,
) -> Vec<PieceInstance> {
    let activation_id = instance.playlist_activation_id.as_deref();
    let own: Vec<PieceInstance> = cache
        .pieces
        .find(|p| p.start_part_id == instance.part.id)
        .into_iter()
        .map(|piece| {
            let mut pi = PieceInstance::wrap(piece, &instance.id, activation_id);
            if piece.lifespan.is_infinite() {
                pi.infinite = Some(InfiniteInfo {
                    infinite_piece_id: piece.id.clone(),
                    start_part_instance_id: instance.id.clone(),
                    end_part_instance_id: None,
                    from_previous_part: false,
                });
            }
            pi
        })
        .collect();

    let mut result = own.clone();
    let Some(previous) = previous else {
        return result;
    };

    for piece in cache.piece_instances_for(&previous.id) {
        let Some(infinite) = &piece.infinite else {
            continue;
        };
        if !continues_into(&piece, previous, &instance.part) {
            continue;
        }
        let replaced = own
            .iter()
            .any(|o| o.piece.source_layer_id == piece.piece.source_layer_id && o.piece.enable.start == 0);
        if replaced {
            debug!(
                infinite_piece_id = %infinite.infinite_piece_id,
                part_id = %instance.part.id,
                "Infinite piece replaced on its source layer"
            );
            continue;
        }

        let mut continued = piece.clone();
        continued.id = PieceInstance::id_for(&instance.id, &piece.piece.id);
        continued.part_instance_id = instance.id.clone();
        continued.playlist_activation_id = instance.playlist_activation_id.clone();
        continued.infinite = Some(InfiniteInfo {
            end_part_instance_id: None,
            from_previous_part: true,
            ..infinite.clone()
        });
        result.push(continued);
    }
    result
}

/// Marque une instance et ses pieces comme `reset`
pub(crate) fn reset_part_instance(cache: &mut CacheForPlayout, part_instance_id: &str) -> Result<()> {
    cache.part_instances.update(part_instance_id, |pi| pi.reset = true)?;
    cache
        .piece_instances
        .update_where(|p| p.part_instance_id == part_instance_id, |p| p.reset = true)?;
    Ok(())
}

/// Remplace le part next du playlist (ou le vide si `part` est `None`)
///
/// L'ancienne instance next, si elle n'a jamais été prise, est marquée `reset`.
pub(crate) fn set_next_part_inner(cache: &mut CacheForPlayout, part: Option<Part>) -> Result<()> {
    let activation_id = require_active(cache)?;

    if let Some(old_next) = cache.next_part_instance() {
        let is_current = cache.playlist.current_part_instance_id.as_deref() == Some(old_next.id.as_str());
        if !old_next.is_taken && !is_current {
            let id = old_next.id.clone();
            reset_part_instance(cache, &id)?;
        }
    }

    let Some(part) = part else {
        cache.playlist.update(|p| p.next_part_instance_id = None)?;
        return Ok(());
    };
    if !part.is_playable() {
        return Err(Error::invalid_state(format!("Part {} is not playable", part.id)));
    }

    let instance = PartInstance {
        id: format!("{}_{}", part.id, Uuid::new_v4().simple()),
        rundown_id: part.rundown_id.clone(),
        segment_id: part.segment_id.clone(),
        playlist_activation_id: Some(activation_id),
        rehearsal: cache.playlist.rehearsal,
        part,
        timings: PartInstanceTimings::default(),
        is_taken: false,
        reset: false,
        previous_part_end_state: None,
    };
    let previous = cache.current_part_instance().cloned();
    let pieces = piece_instances_for_new_part(cache, &instance, previous.as_ref());

    debug!(
        part_instance_id = %instance.id,
        part_id = %instance.part.id,
        pieces = pieces.len(),
        "Next PartInstance created"
    );
    let instance_id = instance.id.clone();
    cache.part_instances.insert(instance)?;
    for piece in pieces {
        cache.piece_instances.insert(piece)?;
    }
    cache.playlist.update(|p| p.next_part_instance_id = Some(instance_id))?;
    Ok(())
}

/// Part next choisi automatiquement après le part current
pub(crate) fn select_and_set_next(cache: &mut CacheForPlayout) -> Result<()> {
    let parts = ordered_parts(cache);
    let next = select_next_part(cache.current_part_instance(), &parts).map(|s| s.part.clone());
    set_next_part_inner(cache, next)
}

/// Choisit le part next ; `None` sélectionne le premier part jouable après le current
pub async fn set_next_part(ctx: &PlayoutContext, playlist_id: &str, part_id: Option<String>) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, move |cache, ctx| {
        require_active(cache)?;
        if matches!(cache.playlist.hold_state, HoldState::Pending | HoldState::Active) {
            return Err(Error::invalid_state("Cannot change the next part during a hold"));
        }

        match part_id {
            Some(id) => {
                let part = cache
                    .parts
                    .find_one(&id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("Part", id.clone()))?;
                set_next_part_inner(cache, Some(part))?;
            }
            None => select_and_set_next(cache)?,
        }
        info!(next_part_instance_id = ?cache.playlist.next_part_instance_id, "Next part set");
        ctx.update_timeline(cache, None)
    })
    .await
}
