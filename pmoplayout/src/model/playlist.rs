use super::impl_document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// État de hold : pont temporaire entre deux parts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldState {
    #[default]
    Inactive,
    Pending,
    Active,
    Complete,
}

/// Une session à l'antenne
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RundownPlaylist {
    #[serde(rename = "_id")]
    pub id: String,
    pub studio_id: String,
    pub name: String,
    /// Présent si et seulement si le playlist est à l'antenne
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_id: Option<String>,
    #[serde(default)]
    pub rehearsal: bool,
    #[serde(default)]
    pub current_part_instance_id: Option<String>,
    #[serde(default)]
    pub next_part_instance_id: Option<String>,
    #[serde(default)]
    pub previous_part_instance_id: Option<String>,
    #[serde(default)]
    pub hold_state: HoldState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_persistent_state: Option<Value>,
}

impl RundownPlaylist {
    pub fn new(id: impl Into<String>, studio_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            studio_id: studio_id.into(),
            name: name.into(),
            activation_id: None,
            rehearsal: false,
            current_part_instance_id: None,
            next_part_instance_id: None,
            previous_part_instance_id: None,
            hold_state: HoldState::Inactive,
            previous_persistent_state: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activation_id.is_some()
    }
}

impl_document!(RundownPlaylist, "rundownPlaylists");
