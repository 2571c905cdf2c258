//! Conducteur de démonstration, semé dans une base vide

use pmoplayout::model::{
    DeviceMapping, LookaheadMode, Mapping, Part, Piece, PieceLifespan, Rundown, RundownPlaylist, Segment,
    Studio, TimelineEnable, TimelineObject,
};
use pmoplayout::store::{DocumentStore, DocumentStoreExt};
use pmoplayout::timeline::Blueprint;
use serde_json::json;
use std::collections::BTreeMap;

pub const STUDIO_ID: &str = "studio-a";
pub const PLAYLIST_ID: &str = "journal-13h";
const RUNDOWN_ID: &str = "journal-13h-rundown";

const CAMERA_LAYER: &str = "atem_me_program";
const CLIP_LAYER: &str = "casparcg_clip";
const LOGO_LAYER: &str = "casparcg_logo";

/// Base studio : mire sur le programme quand rien n'est à l'antenne
pub struct DemoBlueprint;

impl Blueprint for DemoBlueprint {
    fn blueprint_id(&self) -> &str {
        "demo"
    }

    fn blueprint_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn get_studio_baseline(&self, _studio: &Studio) -> anyhow::Result<Vec<TimelineObject>> {
        Ok(vec![
            TimelineObject::new("studio_bars", CAMERA_LAYER, TimelineEnable::while_(1i64.into()))
                .with_content(json!({"deviceType": "atem", "input": "bars"})),
        ])
    }
}

fn studio() -> Studio {
    let mut mappings = BTreeMap::new();
    mappings.insert(
        CAMERA_LAYER.to_string(),
        Mapping::new("atem0", DeviceMapping::Atem { index: 0 }, LookaheadMode::None),
    );
    let mut clip = Mapping::new(
        "caspar0",
        DeviceMapping::Casparcg { channel: 1, layer: 10 },
        LookaheadMode::Preload,
    );
    clip.lookahead_max_search_distance = Some(5);
    mappings.insert(CLIP_LAYER.to_string(), clip);
    mappings.insert(
        LOGO_LAYER.to_string(),
        Mapping::new("caspar0", DeviceMapping::Casparcg { channel: 1, layer: 20 }, LookaheadMode::None),
    );
    Studio {
        id: STUDIO_ID.to_string(),
        name: "Studio A".to_string(),
        mappings,
        blueprint_id: Some("demo".to_string()),
    }
}

fn piece(id: &str, part_id: &str, layer: &str, content: serde_json::Value) -> Piece {
    let mut piece = Piece::new(id, RUNDOWN_ID, part_id, format!("sl_{}", layer));
    piece.name = id.to_string();
    piece.content.timeline_objects.push(
        TimelineObject::new(format!("{}_obj", id), layer, TimelineEnable::start_at(0i64)).with_content(content),
    );
    piece
}

fn part(id: &str, segment_id: &str, rank: f64, title: &str, duration: i64) -> Part {
    let mut part = Part::new(id, RUNDOWN_ID, segment_id, rank);
    part.title = title.to_string();
    part.expected_duration = Some(duration);
    part
}

/// Sème le conducteur si le studio n'existe pas encore
///
/// Retourne `true` si des documents ont été écrits.
pub async fn seed_if_empty(store: &dyn DocumentStore) -> pmoplayout::Result<bool> {
    let existing: Option<Studio> = store.find_doc(STUDIO_ID).await?;
    if existing.is_some() {
        return Ok(false);
    }

    store.insert_doc(&studio()).await?;
    store
        .insert_doc(&RundownPlaylist::new(PLAYLIST_ID, STUDIO_ID, "Journal de 13h"))
        .await?;
    store
        .insert_doc(&Rundown {
            id: RUNDOWN_ID.to_string(),
            playlist_id: PLAYLIST_ID.to_string(),
            studio_id: STUDIO_ID.to_string(),
            name: "Journal de 13h".to_string(),
            rank: 0.0,
        })
        .await?;
    for (id, name, rank) in [("opening", "Ouverture", 0.0), ("news", "Actualités", 1.0)] {
        store
            .insert_doc(&Segment {
                id: id.to_string(),
                rundown_id: RUNDOWN_ID.to_string(),
                name: name.to_string(),
                rank,
            })
            .await?;
    }

    let mut intro = part("intro", "opening", 0.0, "Générique", 8000);
    intro.autonext = true;
    let parts = [
        intro,
        part("headlines", "opening", 1.0, "Titres", 30_000),
        part("story1", "news", 0.0, "Sujet 1", 90_000),
        part("story2", "news", 1.0, "Sujet 2", 75_000),
        part("outro", "news", 2.0, "Fin", 10_000),
    ];

    let mut logo = piece("logo", "headlines", LOGO_LAYER, json!({"deviceType": "casparcg", "template": "logo"}));
    logo.lifespan = PieceLifespan::OutOnRundownEnd;
    let pieces = [
        piece("intro_clip", "intro", CLIP_LAYER, json!({"deviceType": "casparcg", "file": "generique"})),
        piece("headlines_cam", "headlines", CAMERA_LAYER, json!({"deviceType": "atem", "input": 1})),
        logo,
        piece("story1_clip", "story1", CLIP_LAYER, json!({"deviceType": "casparcg", "file": "sujet1"})),
        piece("story2_cam", "story2", CAMERA_LAYER, json!({"deviceType": "atem", "input": 2})),
        piece("story2_clip", "story2", CLIP_LAYER, json!({"deviceType": "casparcg", "file": "sujet2"})),
        piece("outro_cam", "outro", CAMERA_LAYER, json!({"deviceType": "atem", "input": 1})),
    ];

    for p in &parts {
        store.insert_doc(p).await?;
    }
    for p in &pieces {
        store.insert_doc(p).await?;
    }
    Ok(true)
}
