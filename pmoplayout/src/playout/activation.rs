//! Mise à l'antenne et retrait d'un playlist

use super::PlayoutContext;
use super::instances::select_and_set_next;
use crate::cache::{Cache, CacheForStudio};
use crate::get_current_time;
use crate::lock::OperationPriority;
use crate::model::{HoldState, RundownPlaylist};
use crate::store::DocumentStoreExt;
use crate::{Error, Result};
use tracing::info;
use uuid::Uuid;

async fn playlist_studio_id(ctx: &PlayoutContext, playlist_id: &str) -> Result<String> {
    let playlist: RundownPlaylist = ctx
        .store()
        .find_doc(playlist_id)
        .await?
        .ok_or_else(|| Error::not_found("RundownPlaylist", playlist_id))?;
    Ok(playlist.studio_id)
}

/// Met le playlist à l'antenne (répétition ou direct)
///
/// Refusé si un autre playlist du même studio est déjà actif. Un playlist
/// déjà actif ne change que de mode.
pub async fn activate_rundown_playlist(ctx: &PlayoutContext, playlist_id: &str, rehearsal: bool) -> Result<()> {
    let priority = OperationPriority::UserPlayout;
    let studio_id = playlist_studio_id(ctx, playlist_id).await?;

    // verrou studio, puis verrou playlist
    let _studio_lock = ctx.lock_studio(&studio_id, priority).await?;
    let studio_cache = CacheForStudio::create(ctx.store().clone(), &studio_id, ctx.options().cache.clone()).await?;
    let others: Vec<String> = studio_cache
        .get_active_rundown_playlists(Some(playlist_id))
        .iter()
        .map(|p| p.id.clone())
        .collect();
    studio_cache.assert_no_changes()?;
    if !others.is_empty() {
        return Err(Error::invalid_state(format!(
            "Only one playlist can be active at the same time in studio {} (active: {})",
            studio_id,
            others.join(", ")
        )));
    }

    ctx.run_playout_operation(playlist_id, priority, move |cache, ctx| {
        if cache.playlist.is_active() {
            if cache.playlist.rehearsal != rehearsal {
                cache.playlist.update(|p| p.rehearsal = rehearsal)?;
                info!(rehearsal, "Playlist activation mode changed");
            }
            return Ok(());
        }

        // Les instances d'une activation précédente ne sont plus jouables
        cache.part_instances.update_where(|pi| !pi.reset, |pi| pi.reset = true)?;
        cache.piece_instances.update_where(|p| !p.reset, |p| p.reset = true)?;

        let activation_id = Uuid::new_v4().to_string();
        cache.playlist.update(|p| {
            p.activation_id = Some(activation_id.clone());
            p.rehearsal = rehearsal;
            p.current_part_instance_id = None;
            p.next_part_instance_id = None;
            p.previous_part_instance_id = None;
            p.hold_state = HoldState::Inactive;
        })?;

        select_and_set_next(cache)?;
        info!(%activation_id, rehearsal, "Playlist activated");
        ctx.update_timeline(cache, None)
    })
    .await
}

/// Retire le playlist de l'antenne ; le studio repasse sur sa base
pub async fn deactivate_rundown_playlist(ctx: &PlayoutContext, playlist_id: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::UserPlayout, |cache, ctx| {
        if !cache.playlist.is_active() {
            return Err(Error::invalid_state(format!("RundownPlaylist {} is not active", playlist_id)));
        }

        let now = get_current_time();
        if let Some(current) = cache.current_part_instance() {
            if current.timings.started_playback.is_some() && current.timings.stopped_playback.is_none() {
                let id = current.id.clone();
                cache.part_instances.update(&id, |pi| pi.timings.stopped_playback = Some(now))?;
            }
        }
        if let Some(next) = cache.next_part_instance().filter(|n| !n.is_taken) {
            let id = next.id.clone();
            super::instances::reset_part_instance(cache, &id)?;
        }

        cache.playlist.update(|p| {
            p.activation_id = None;
            p.current_part_instance_id = None;
            p.next_part_instance_id = None;
            p.previous_part_instance_id = None;
            p.hold_state = HoldState::Inactive;
        })?;
        info!("Playlist deactivated");
        ctx.update_timeline(cache, None)
    })
    .await
}

/// Supprime le playlist et le contenu de ses rundowns
pub async fn remove_rundown_playlist(ctx: &PlayoutContext, playlist_id: &str) -> Result<()> {
    ctx.run_playout_operation(playlist_id, OperationPriority::Maintenance, |cache, _ctx| {
        if cache.playlist.is_active() {
            return Err(Error::invalid_state(format!(
                "RundownPlaylist {} is active and cannot be removed",
                playlist_id
            )));
        }
        cache.remove_playlist();
        Ok(())
    })
    .await
}
