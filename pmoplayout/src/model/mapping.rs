//! Mappings : liaison d'une couche logique vers un périphérique physique

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookaheadMode {
    #[default]
    None,
    /// Précharge sur une couche tampon distincte
    Preload,
    Retain,
    /// Conserve le dernier contenu connu jusqu'à ce que la couche soit libérée
    WhenClear,
}

/// Paramètres propres à chaque type de périphérique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "deviceType", rename_all = "lowercase")]
pub enum DeviceMapping {
    Abstract,
    Casparcg { channel: u32, layer: u32 },
    Atem { index: u32 },
    Lawo { identifier: String },
    Vmix { index: u32 },
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Abstract,
    Casparcg,
    Atem,
    Lawo,
    Vmix,
    Http,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Abstract => "abstract",
            DeviceType::Casparcg => "casparcg",
            DeviceType::Atem => "atem",
            DeviceType::Lawo => "lawo",
            DeviceType::Vmix => "vmix",
            DeviceType::Http => "http",
        };
        f.write_str(name)
    }
}

impl DeviceMapping {
    pub fn device_type(&self) -> DeviceType {
        match self {
            DeviceMapping::Abstract => DeviceType::Abstract,
            DeviceMapping::Casparcg { .. } => DeviceType::Casparcg,
            DeviceMapping::Atem { .. } => DeviceType::Atem,
            DeviceMapping::Lawo { .. } => DeviceType::Lawo,
            DeviceMapping::Vmix { .. } => DeviceType::Vmix,
            DeviceMapping::Http => DeviceType::Http,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub device_id: String,
    #[serde(flatten)]
    pub device: DeviceMapping,
    #[serde(default)]
    pub lookahead: LookaheadMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead_max_search_distance: Option<usize>,
}

impl Mapping {
    pub fn new(device_id: impl Into<String>, device: DeviceMapping, lookahead: LookaheadMode) -> Self {
        Self {
            device_id: device_id.into(),
            device,
            lookahead,
            lookahead_depth: None,
            lookahead_max_search_distance: None,
        }
    }

    /// Nombre d'objets futurs recherchés
    pub fn lookahead_target_objects(&self) -> usize {
        match self.lookahead {
            LookaheadMode::Preload | LookaheadMode::WhenClear => self.lookahead_depth.unwrap_or(1).max(1),
            LookaheadMode::None | LookaheadMode::Retain => 1,
        }
    }
}
