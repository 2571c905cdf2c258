use super::{TimelineObject, impl_document};
use serde::{Deserialize, Serialize};

/// Conteneur ordonné de segments dans un playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rundown {
    #[serde(rename = "_id")]
    pub id: String,
    pub playlist_id: String,
    pub studio_id: String,
    pub name: String,
    #[serde(rename = "_rank", default)]
    pub rank: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(rename = "_id")]
    pub id: String,
    pub rundown_id: String,
    pub name: String,
    #[serde(rename = "_rank", default)]
    pub rank: f64,
}

/// Objets de fond d'un rundown, émis sans groupe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RundownBaselineObjects {
    #[serde(rename = "_id")]
    pub id: String,
    pub rundown_id: String,
    #[serde(default)]
    pub objects: Vec<TimelineObject>,
}

impl_document!(Rundown, "rundowns");
impl_document!(Segment, "segments");
impl_document!(RundownBaselineObjects, "rundownBaselineObjs");
