//! Objet stat : empreinte du timeline d'un studio
//!
//! Les consommateurs comparent `objHash` pour savoir si quelque chose a
//! changé sans relire tous les objets.

use crate::cache::WriteCollection;
use crate::model::{TimelineEnable, TimelineObject, TimelineObjectType};
use crate::Result;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

pub const STAT_OBJECT_ID: &str = "statObj";
pub const STAT_LAYER: &str = "__stat";

/// Empreinte SHA-256 des objets, triés par `_id` décroissant
pub fn timeline_hash(objects: &[&TimelineObject]) -> Result<String> {
    let mut sorted: Vec<&TimelineObject> = objects.to_vec();
    sorted.sort_by(|a, b| b.internal_id.cmp(&a.internal_id));

    let mut hasher = Sha256::new();
    for obj in sorted {
        hasher.update(serde_json::to_vec(obj)?);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn stat_object(studio_id: &str, count: usize, hash: &str, now: i64) -> TimelineObject {
    let mut obj = TimelineObject::new(STAT_OBJECT_ID, STAT_LAYER, TimelineEnable::start_at(0i64))
        .with_content(json!({
            "deviceType": "abstract",
            "type": "nothing",
            "modified": now,
            "objCount": count,
            "objHash": hash,
        }));
    obj.object_type = TimelineObjectType::Stat;
    obj.studio_id = studio_id.to_string();
    obj.internal_id = format!("{}_{}", studio_id, STAT_OBJECT_ID);
    obj
}

/// Réécrit l'objet stat du studio si le nombre d'objets ou l'empreinte a changé
///
/// Retourne `true` si l'objet a été réécrit.
pub fn update_stat_object(
    timeline: &mut WriteCollection<TimelineObject>,
    studio_id: &str,
    now: i64,
) -> Result<bool> {
    let objects = timeline.find(|o| o.studio_id == studio_id && o.object_type != TimelineObjectType::Stat);
    let count = objects.len();
    let hash = timeline_hash(&objects)?;

    let internal_id = format!("{}_{}", studio_id, STAT_OBJECT_ID);
    if let Some(existing) = timeline.find_one(&internal_id) {
        if existing.content["objHash"] == hash.as_str() && existing.content["objCount"] == count {
            return Ok(false);
        }
    }

    debug!(studio_id, count, hash = %hash, "Timeline stat object updated");
    timeline.replace(stat_object(studio_id, count, &hash, now))?;
    Ok(true)
}
