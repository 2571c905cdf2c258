//! Données et doublures partagées par les tests d'intégration

#![allow(dead_code)]

use async_trait::async_trait;
use pmoplayout::cache::CacheOptions;
use pmoplayout::model::{
    DeviceMapping, LookaheadMode, Mapping, Part, Piece, PieceLifespan, Rundown, RundownPlaylist, Segment,
    Studio, TimelineEnable, TimelineObject,
};
use pmoplayout::store::{BulkOp, DocumentStore, DocumentStoreExt, FindOptions, MemoryStore, Selector};
use pmoplayout::timeline::{Blueprint, DefaultBlueprint, ResolvedPieceInstance, TimelineGenerateContext, TimelineGenerateResult};
use pmoplayout::{Error, PlayoutContext, PlayoutOptions, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STUDIO: &str = "studio0";
pub const PLAYLIST: &str = "playlist0";
pub const RUNDOWN: &str = "rundown0";
pub const SEGMENT: &str = "segment0";

/// Couche de sortie préchargée (serveur vidéo)
pub const VIDEO_LAYER: &str = "casparcg_player";
/// Couche de mélangeur, sans lookahead
pub const MIXER_LAYER: &str = "atem_me";

pub fn studio() -> Studio {
    let mut mappings = BTreeMap::new();
    mappings.insert(
        VIDEO_LAYER.to_string(),
        Mapping::new("caspar0", DeviceMapping::Casparcg { channel: 1, layer: 10 }, LookaheadMode::Preload),
    );
    mappings.insert(
        MIXER_LAYER.to_string(),
        Mapping::new("atem0", DeviceMapping::Atem { index: 0 }, LookaheadMode::None),
    );
    Studio {
        id: STUDIO.to_string(),
        name: "Studio test".to_string(),
        mappings,
        blueprint_id: None,
    }
}

pub fn part(id: &str, rank: f64) -> Part {
    let mut part = Part::new(id, RUNDOWN, SEGMENT, rank);
    part.title = id.to_uppercase();
    part
}

/// Piece avec un unique objet timeline sur `layer`
pub fn piece(id: &str, part_id: &str, layer: &str, start: i64) -> Piece {
    let mut piece = Piece::new(id, RUNDOWN, part_id, format!("sl_{}", layer));
    piece.name = id.to_string();
    piece.enable.start = start;
    piece.content.timeline_objects.push(
        TimelineObject::new(format!("{}_obj", id), layer, TimelineEnable::start_at(0i64))
            .with_content(json!({"deviceType": "abstract", "clip": id})),
    );
    piece
}

pub fn infinite_piece(id: &str, part_id: &str, layer: &str) -> Piece {
    let mut piece = piece(id, part_id, layer, 0);
    piece.lifespan = PieceLifespan::OutOnSegmentEnd;
    piece
}

/// Studio, playlist, rundown et segment, puis les parts et pieces donnés
pub async fn seed(store: &dyn DocumentStore, parts: &[Part], pieces: &[Piece]) -> Result<()> {
    store.insert_doc(&studio()).await?;
    store
        .insert_doc(&RundownPlaylist::new(PLAYLIST, STUDIO, "Journal de 13h"))
        .await?;
    store
        .insert_doc(&Rundown {
            id: RUNDOWN.to_string(),
            playlist_id: PLAYLIST.to_string(),
            studio_id: STUDIO.to_string(),
            name: "Conducteur".to_string(),
            rank: 0.0,
        })
        .await?;
    store
        .insert_doc(&Segment {
            id: SEGMENT.to_string(),
            rundown_id: RUNDOWN.to_string(),
            name: "Ouverture".to_string(),
            rank: 0.0,
        })
        .await?;
    for p in parts {
        store.insert_doc(p).await?;
    }
    for p in pieces {
        store.insert_doc(p).await?;
    }
    Ok(())
}

/// Remplace le studio par une variante (mappings de test)
pub async fn replace_studio(store: &dyn DocumentStore, studio: &Studio) -> Result<()> {
    store
        .bulk_write(
            "studios",
            vec![BulkOp::ReplaceOne {
                id: studio.id.clone(),
                doc: serde_json::to_value(studio)?,
            }],
        )
        .await?;
    Ok(())
}

pub fn options() -> PlayoutOptions {
    PlayoutOptions {
        cache: CacheOptions {
            timeline_flush_delay: Duration::ZERO,
            production: false,
        },
        ..Default::default()
    }
}

pub fn context(store: Arc<dyn DocumentStore>) -> PlayoutContext {
    PlayoutContext::new(store, Arc::new(DefaultBlueprint), options())
}

pub fn context_with_blueprint(store: Arc<dyn DocumentStore>, blueprint: Arc<dyn Blueprint>) -> PlayoutContext {
    PlayoutContext::new(store, blueprint, options())
}

/// Store mémoire prérempli avec trois parts simples
pub async fn three_part_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let parts = [part("p1", 1.0), part("p2", 2.0), part("p3", 3.0)];
    let pieces = [
        piece("p1_cam", "p1", MIXER_LAYER, 0),
        piece("p2_cam", "p2", MIXER_LAYER, 0),
        piece("p3_cam", "p3", MIXER_LAYER, 0),
    ];
    seed(store.as_ref(), &parts, &pieces).await.unwrap();
    store
}

pub async fn load_playlist(store: &dyn DocumentStore) -> RundownPlaylist {
    store.find_doc(PLAYLIST).await.unwrap().unwrap()
}

pub async fn load_timeline(store: &dyn DocumentStore) -> Vec<TimelineObject> {
    store
        .find_docs(&Selector::eq("studioId", STUDIO), &FindOptions::default())
        .await
        .unwrap()
}

pub fn find_object<'a>(objects: &'a [TimelineObject], id: &str) -> Option<&'a TimelineObject> {
    objects.iter().find(|o| o.id == id)
}

/// Store mémoire qui journalise les écritures groupées et peut les refuser
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    fail_writes: AtomicBool,
    writes: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Collections écrites, dans l'ordre
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn find(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Result<Vec<Value>> {
        self.inner.find(collection, selector, options).await
    }

    async fn bulk_write(&self, collection: &str, ops: Vec<BulkOp>) -> Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("write refused on {}", collection)));
        }
        self.writes.lock().unwrap().push(collection.to_string());
        self.inner.bulk_write(collection, ops).await
    }
}

/// Blueprint dont la personnalisation échoue toujours
pub struct FailingBlueprint;

impl Blueprint for FailingBlueprint {
    fn blueprint_id(&self) -> &str {
        "failing"
    }

    fn blueprint_version(&self) -> &str {
        "0.0.1"
    }

    fn on_timeline_generate(
        &self,
        _context: &TimelineGenerateContext,
        _objects: Vec<TimelineObject>,
        _previous_persistent_state: Option<&Value>,
        _previous_part_end_state: Option<&Value>,
        _resolved_pieces: &[ResolvedPieceInstance],
    ) -> anyhow::Result<TimelineGenerateResult> {
        anyhow::bail!("graphics template missing")
    }
}

/// Blueprint qui compte ses générations dans l'état persistant
pub struct CountingBlueprint;

impl Blueprint for CountingBlueprint {
    fn blueprint_id(&self) -> &str {
        "counting"
    }

    fn blueprint_version(&self) -> &str {
        "1.2.0"
    }

    fn get_studio_baseline(&self, studio: &Studio) -> anyhow::Result<Vec<TimelineObject>> {
        Ok(vec![
            TimelineObject::new("studio_idle", MIXER_LAYER, TimelineEnable::while_(1i64.into()))
                .with_content(json!({"deviceType": "abstract", "studio": studio.id})),
        ])
    }

    fn on_timeline_generate(
        &self,
        _context: &TimelineGenerateContext,
        objects: Vec<TimelineObject>,
        previous_persistent_state: Option<&Value>,
        _previous_part_end_state: Option<&Value>,
        _resolved_pieces: &[ResolvedPieceInstance],
    ) -> anyhow::Result<TimelineGenerateResult> {
        let count = previous_persistent_state
            .and_then(|s| s.get("generations"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(TimelineGenerateResult {
            timeline: objects,
            persistent_state: Some(json!({"generations": count + 1})),
        })
    }
}
