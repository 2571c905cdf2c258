use super::{impl_document, is_false};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Part (gabarit) : unité planifiable d'un segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(rename = "_id")]
    pub id: String,
    pub rundown_id: String,
    pub segment_id: String,
    #[serde(rename = "_rank", default)]
    pub rank: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub autonext: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonext_overlap: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preroll_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_preroll_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_keepalive_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_out_transition: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes_for_next: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub invalid: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub floated: bool,
    /// Part insérée dynamiquement (ad-lib), chaînée derrière ce part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamically_inserted_after_part_id: Option<String>,
}

impl Part {
    pub fn new(
        id: impl Into<String>,
        rundown_id: impl Into<String>,
        segment_id: impl Into<String>,
        rank: f64,
    ) -> Self {
        Self {
            id: id.into(),
            rundown_id: rundown_id.into(),
            segment_id: segment_id.into(),
            rank,
            title: String::new(),
            expected_duration: None,
            autonext: false,
            autonext_overlap: None,
            preroll_duration: None,
            transition_preroll_duration: None,
            transition_keepalive_duration: None,
            disable_out_transition: false,
            classes: Vec::new(),
            classes_for_next: Vec::new(),
            invalid: false,
            floated: false,
            dynamically_inserted_after_part_id: None,
        }
    }

    pub fn is_playable(&self) -> bool {
        !self.invalid && !self.floated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartInstanceTimings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_playback: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_playback: Option<i64>,
}

/// Occurrence jouée d'un part
///
/// Une instance n'est jamais supprimée pendant l'émission : elle est marquée
/// `reset` puis nettoyée plus tard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartInstance {
    #[serde(rename = "_id")]
    pub id: String,
    pub rundown_id: String,
    pub segment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_activation_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rehearsal: bool,
    pub part: Part,
    #[serde(default)]
    pub timings: PartInstanceTimings,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_taken: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reset: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_part_end_state: Option<Value>,
}

impl PartInstance {
    pub fn last_started_playback(&self) -> Option<i64> {
        self.timings.started_playback
    }
}

impl_document!(Part, "parts");
impl_document!(PartInstance, "partInstances");
