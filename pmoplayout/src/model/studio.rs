use super::{Mapping, impl_document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Studio {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Couches de sortie, ordonnées par identifiant
    #[serde(default)]
    pub mappings: BTreeMap<String, Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralDevice {
    #[serde(rename = "_id")]
    pub id: String,
    pub studio_id: String,
    pub name: String,
    #[serde(default)]
    pub connected: bool,
}

impl_document!(Studio, "studios");
impl_document!(PeripheralDevice, "peripheralDevices");
