use super::base::{Cache, CacheCore, CacheOptions};
use super::collection::{DbCacheWritable, ReadCollection, WriteCollection};
use crate::model::{PeripheralDevice, RundownPlaylist, Studio, TimelineObject};
use crate::store::{DocumentStore, DocumentStoreExt, Selector};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Cache réduit aux ressources d'un studio
///
/// Utilisé quand une opération n'a pas besoin de l'état complet d'un
/// playlist : vérification des playlists actifs, timeline de base.
pub struct CacheForStudio {
    core: CacheCore<Self>,

    pub studio: Studio,
    pub peripheral_devices: ReadCollection<PeripheralDevice>,
    pub playlists: ReadCollection<RundownPlaylist>,
    pub timeline: WriteCollection<TimelineObject>,
}

impl CacheForStudio {
    pub async fn create(store: Arc<dyn DocumentStore>, studio_id: &str, options: CacheOptions) -> Result<Self> {
        let studio: Studio = store
            .find_doc(studio_id)
            .await?
            .ok_or_else(|| Error::not_found("Studio", studio_id))?;

        let s = store.as_ref();
        let (peripheral_devices, playlists, timeline) = tokio::try_join!(
            ReadCollection::load(s, Selector::eq("studioId", studio_id)),
            ReadCollection::load(s, Selector::eq("studioId", studio_id)),
            WriteCollection::load(s, Selector::eq("studioId", studio_id)),
        )?;

        Ok(Self {
            core: CacheCore::new(store, options),
            studio,
            peripheral_devices,
            playlists,
            timeline,
        })
    }

    /// Playlists à l'antenne dans ce studio, hors `exclude`
    pub fn get_active_rundown_playlists(&self, exclude: Option<&str>) -> Vec<&RundownPlaylist> {
        self.playlists
            .find(|p| p.is_active() && Some(p.id.as_str()) != exclude)
    }
}

#[async_trait]
impl Cache for CacheForStudio {
    fn core(&self) -> &CacheCore<Self> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<Self> {
        &mut self.core
    }

    fn collections(&self) -> Vec<&dyn DbCacheWritable> {
        vec![&self.timeline as &dyn DbCacheWritable]
    }

    fn collections_mut(&mut self) -> Vec<&mut dyn DbCacheWritable> {
        vec![&mut self.timeline as &mut dyn DbCacheWritable]
    }
}
