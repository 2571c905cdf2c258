//! Take et hold

use super::PlayoutContext;
use super::instances::{require_active, select_and_set_next};
use crate::cache::CacheForPlayout;
use crate::get_current_time;
use crate::lock::OperationPriority;
use crate::model::HoldState;
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Promeut le part next en current, sans régénérer le timeline
///
/// Retourne l'identifiant de la nouvelle instance current.
pub(crate) fn take_next_part_inner(cache: &mut CacheForPlayout, now: i64) -> Result<String> {
    require_active(cache)?;
    let next_id = cache
        .playlist
        .next_part_instance_id
        .clone()
        .ok_or_else(|| Error::invalid_state("No next part to take"))?;
    if cache.part_instances.find_one(&next_id).is_none() {
        return Err(Error::not_found("PartInstance", next_id));
    }
    let previous_id = cache.playlist.current_part_instance_id.clone();

    match cache.playlist.hold_state {
        HoldState::Pending => cache.playlist.update(|p| p.hold_state = HoldState::Active)?,
        HoldState::Complete => cache.playlist.update(|p| p.hold_state = HoldState::Inactive)?,
        HoldState::Inactive | HoldState::Active => {}
    }

    cache.part_instances.update(&next_id, |pi| {
        pi.is_taken = true;
        pi.timings.take = Some(now);
    })?;

    if let Some(previous_id) = &previous_id {
        sync_infinite_continuations(cache, previous_id, &next_id)?;
    }

    cache.playlist.update(|p| {
        p.previous_part_instance_id = previous_id.clone();
        p.current_part_instance_id = Some(next_id.clone());
        p.next_part_instance_id = None;
    })?;

    select_and_set_next(cache)?;
    info!(
        previous = ?previous_id,
        current = %next_id,
        next = ?cache.playlist.next_part_instance_id,
        "Take performed"
    );
    Ok(next_id)
}

/// Aligne les infinis prolongés dans `to` sur leur état dans `from`, et
/// plafonne dans `from` ceux qui ne continuent pas
fn sync_infinite_continuations(cache: &mut CacheForPlayout, from: &str, to: &str) -> Result<()> {
    let started: HashMap<String, Option<i64>> = cache
        .piece_instances_for(from)
        .into_iter()
        .filter_map(|p| {
            let id = p.infinite_piece_id()?.to_string();
            Some((id, p.started_playback))
        })
        .collect();
    let continued: Vec<String> = cache
        .piece_instances_for(to)
        .iter()
        .filter_map(|p| p.infinite_piece_id().map(str::to_string))
        .collect();

    cache.piece_instances.update_where(
        |p| p.part_instance_id == to && !p.reset,
        |p| {
            let start = p
                .infinite
                .as_ref()
                .filter(|i| i.from_previous_part)
                .and_then(|i| started.get(&i.infinite_piece_id).copied().flatten());
            if let (Some(start), None) = (start, p.started_playback) {
                p.started_playback = Some(start);
            }
        },
    )?;

    let capped = cache.piece_instances.update_where(
        |p| {
            p.part_instance_id == from
                && !p.reset
                && p.infinite_piece_id().is_some_and(|id| !continued.iter().any(|c| c == id))
        },
        |p| {
            if let Some(infinite) = &mut p.infinite {
                infinite.end_part_instance_id = Some(from.to_string());
            }
        },
    )?;
    debug!(from, to, capped, "Infinite pieces synchronised on take");
    Ok(())
}

/// Take : le part next devient current
///
/// Pendant un hold actif, le take termine le hold sans changer de part.
pub async fn take_next_part(ctx: &PlayoutContext, playlist_id: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, |cache, ctx| {
        require_active(cache)?;
        if cache.playlist.hold_state == HoldState::Active {
            cache.playlist.update(|p| p.hold_state = HoldState::Complete)?;
            info!("Hold completed");
            return ctx.update_timeline(cache, None);
        }
        take_next_part_inner(cache, get_current_time())?;
        ctx.update_timeline(cache, None)
    })
    .await
}

/// Arme un hold entre le part current et le part next
pub async fn activate_hold(ctx: &PlayoutContext, playlist_id: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, |cache, ctx| {
        require_active(cache)?;
        if cache.playlist.hold_state != HoldState::Inactive {
            return Err(Error::invalid_state("A hold is already in progress"));
        }
        if cache.current_part_instance().is_none() || cache.next_part_instance().is_none() {
            return Err(Error::invalid_state("Hold needs both a current and a next part"));
        }
        cache.playlist.update(|p| p.hold_state = HoldState::Pending)?;
        ctx.update_timeline(cache, None)
    })
    .await
}

/// Annule un hold armé mais pas encore pris
pub async fn deactivate_hold(ctx: &PlayoutContext, playlist_id: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, |cache, ctx| {
        require_active(cache)?;
        if cache.playlist.hold_state != HoldState::Pending {
            return Err(Error::invalid_state("No pending hold to cancel"));
        }
        cache.playlist.update(|p| p.hold_state = HoldState::Inactive)?;
        ctx.update_timeline(cache, None)
    })
    .await
}
