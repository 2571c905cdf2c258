use super::base::{Cache, CacheCore, CacheOptions, run_after_save, run_deferred, save_all};
use super::collection::{DbCacheWritable, ReadCollection, WriteCollection};
use super::object::WriteObject;
use crate::model::{
    Document, Part, PartInstance, Piece, PieceInstance, Rundown, RundownBaselineObjects,
    RundownPlaylist, Segment, Studio, TimelineObject,
};
use crate::store::{DocumentStore, DocumentStoreExt, Selector};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache complet d'un playlist, pour les opérations de playout et d'ingest
///
/// Les PartInstances chargées sont celles de l'activation courante et non
/// `reset` ; les PieceInstances sont celles des instances previous, current
/// et next.
pub struct CacheForPlayout {
    core: CacheCore<Self>,
    /// Rundowns à supprimer au commit, si le playlist est retiré
    removal: Option<Vec<String>>,

    pub studio: Studio,
    pub playlist: WriteObject<RundownPlaylist>,
    pub rundowns: WriteCollection<Rundown>,
    pub segments: ReadCollection<Segment>,
    pub parts: WriteCollection<Part>,
    pub pieces: WriteCollection<Piece>,
    pub part_instances: WriteCollection<PartInstance>,
    pub piece_instances: WriteCollection<PieceInstance>,
    pub baseline_objects: ReadCollection<RundownBaselineObjects>,
    pub timeline: WriteCollection<TimelineObject>,
}

impl CacheForPlayout {
    pub async fn create(
        store: Arc<dyn DocumentStore>,
        playlist_id: &str,
        options: CacheOptions,
    ) -> Result<Self> {
        let playlist: RundownPlaylist = store
            .find_doc(playlist_id)
            .await?
            .ok_or_else(|| Error::not_found("RundownPlaylist", playlist_id))?;
        let studio: Studio = store
            .find_doc(&playlist.studio_id)
            .await?
            .ok_or_else(|| Error::not_found("Studio", playlist.studio_id.clone()))?;

        let rundowns =
            WriteCollection::<Rundown>::load(store.as_ref(), Selector::eq("playlistId", playlist.id.as_str()))
                .await?;
        let rundown_ids: Vec<String> = rundowns.iter().map(|r| r.id.clone()).collect();
        let by_rundown = Selector::in_("rundownId", rundown_ids.iter().map(String::as_str));

        let mut instance_selector = by_rundown.clone().and(Selector::ne("reset", true));
        if let Some(activation_id) = &playlist.activation_id {
            instance_selector = instance_selector.and(Selector::eq("playlistActivationId", activation_id.as_str()));
        }
        let selected: Vec<&str> = [
            &playlist.previous_part_instance_id,
            &playlist.current_part_instance_id,
            &playlist.next_part_instance_id,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
        let piece_instance_selector =
            Selector::in_("partInstanceId", selected).and(Selector::ne("reset", true));

        let s = store.as_ref();
        let (segments, parts, pieces, part_instances, piece_instances, baseline_objects, timeline) = tokio::try_join!(
            ReadCollection::<Segment>::load(s, by_rundown.clone()),
            WriteCollection::<Part>::load(s, by_rundown.clone()),
            WriteCollection::<Piece>::load(s, by_rundown.clone()),
            WriteCollection::<PartInstance>::load(s, instance_selector),
            WriteCollection::<PieceInstance>::load(s, piece_instance_selector),
            ReadCollection::<RundownBaselineObjects>::load(s, by_rundown.clone()),
            WriteCollection::<TimelineObject>::load(s, Selector::eq("studioId", studio.id.as_str())),
        )?;

        debug!(
            playlist_id,
            rundowns = rundowns.len(),
            parts = parts.len(),
            part_instances = part_instances.len(),
            "Playout cache loaded"
        );

        Ok(Self {
            core: CacheCore::new(store, options),
            removal: None,
            studio,
            playlist: WriteObject::new(playlist)?,
            rundowns,
            segments,
            parts,
            pieces,
            part_instances,
            piece_instances,
            baseline_objects,
            timeline,
        })
    }

    pub fn playlist_id(&self) -> &str {
        &self.playlist.id
    }

    pub fn current_part_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .current_part_instance_id
            .as_deref()
            .and_then(|id| self.part_instances.find_one(id))
    }

    pub fn next_part_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .next_part_instance_id
            .as_deref()
            .and_then(|id| self.part_instances.find_one(id))
    }

    pub fn previous_part_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .previous_part_instance_id
            .as_deref()
            .and_then(|id| self.part_instances.find_one(id))
    }

    /// PieceInstances non `reset` d'une instance
    pub fn piece_instances_for(&self, part_instance_id: &str) -> Vec<PieceInstance> {
        let mut found: Vec<PieceInstance> = self
            .piece_instances
            .find(|p| p.part_instance_id == part_instance_id && !p.reset)
            .into_iter()
            .cloned()
            .collect();
        found.sort_by(|a, b| a.piece.enable.start.cmp(&b.piece.enable.start).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Le commit supprimera le playlist et son contenu au lieu d'enregistrer les différences
    pub fn remove_playlist(&mut self) {
        if self.playlist.is_active() {
            warn!(playlist_id = %self.playlist.id, "Removing an active playlist");
        }
        self.removal = Some(self.rundowns.iter().map(|r| r.id.clone()).collect());
        for collection in self.collections_mut() {
            collection.mark_for_removal();
        }
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.removal.is_some()
    }

    async fn remove_from_store(
        store: Arc<dyn DocumentStore>,
        playlist_id: String,
        rundown_ids: &[String],
    ) -> Result<()> {
        let by_rundown = Selector::in_("rundownId", rundown_ids.iter().map(String::as_str));
        let commit = |e: Error| Error::CommitFailure(format!("remove playlist: {}", e));

        for collection in [
            PieceInstance::COLLECTION,
            PartInstance::COLLECTION,
            Piece::COLLECTION,
            Part::COLLECTION,
            Segment::COLLECTION,
            RundownBaselineObjects::COLLECTION,
        ] {
            store.remove(collection, &by_rundown).await.map_err(commit)?;
        }
        store
            .remove(Rundown::COLLECTION, &Selector::eq("playlistId", playlist_id.as_str()))
            .await
            .map_err(commit)?;
        store
            .remove(RundownPlaylist::COLLECTION, &Selector::Id(playlist_id.clone()))
            .await
            .map_err(commit)?;
        info!(playlist_id = %playlist_id, "Playlist removed");
        Ok(())
    }
}

#[async_trait]
impl Cache for CacheForPlayout {
    fn core(&self) -> &CacheCore<Self> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<Self> {
        &mut self.core
    }

    fn collections(&self) -> Vec<&dyn DbCacheWritable> {
        vec![
            &self.timeline as &dyn DbCacheWritable,
            &self.playlist,
            &self.rundowns,
            &self.parts,
            &self.pieces,
            &self.part_instances,
            &self.piece_instances,
        ]
    }

    fn collections_mut(&mut self) -> Vec<&mut dyn DbCacheWritable> {
        vec![
            &mut self.timeline as &mut dyn DbCacheWritable,
            &mut self.playlist,
            &mut self.rundowns,
            &mut self.parts,
            &mut self.pieces,
            &mut self.part_instances,
            &mut self.piece_instances,
        ]
    }

    async fn save_all_to_database(&mut self) -> Result<()> {
        match self.removal.take() {
            Some(rundown_ids) => {
                // les collections vidées refusent toute écriture du travail différé
                if let Err(e) = run_deferred(self) {
                    self.removal = Some(rundown_ids);
                    return Err(e);
                }
                let store = self.core.store().clone();
                if let Err(e) = Self::remove_from_store(store, self.playlist.id.clone(), &rundown_ids).await {
                    self.removal = Some(rundown_ids);
                    return Err(e);
                }
                run_after_save(self).await;
                Ok(())
            }
            None => save_all(self).await,
        }
    }

    fn discard_changes(&mut self) {
        self.removal = None;
        for collection in self.collections_mut() {
            collection.discard_changes();
        }
        self.core.clear_deferred();
    }
}
