use super::{TimelineObject, impl_document, is_false};
use serde::{Deserialize, Serialize};

/// Durée de vie d'un piece au-delà de son part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PieceLifespan {
    #[default]
    WithinPart,
    OutOnSegmentEnd,
    OutOnRundownEnd,
}

impl PieceLifespan {
    pub fn is_infinite(&self) -> bool {
        !matches!(self, PieceLifespan::WithinPart)
    }
}

/// Placement d'un piece, relatif au début de son part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceEnable {
    #[serde(default)]
    pub start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceContent {
    #[serde(default)]
    pub timeline_objects: Vec<TimelineObject>,
}

/// Piece (gabarit) : élément jouable d'un part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    #[serde(rename = "_id")]
    pub id: String,
    pub rundown_id: String,
    /// Part dans lequel le piece démarre
    pub start_part_id: String,
    #[serde(default)]
    pub name: String,
    pub source_layer_id: String,
    #[serde(default)]
    pub enable: PieceEnable,
    #[serde(default)]
    pub lifespan: PieceLifespan,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_transition: bool,
    #[serde(rename = "virtual", default, skip_serializing_if = "is_false")]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_lib_source_id: Option<String>,
    #[serde(default)]
    pub content: PieceContent,
}

impl Piece {
    pub fn new(
        id: impl Into<String>,
        rundown_id: impl Into<String>,
        start_part_id: impl Into<String>,
        source_layer_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rundown_id: rundown_id.into(),
            start_part_id: start_part_id.into(),
            name: String::new(),
            source_layer_id: source_layer_id.into(),
            enable: PieceEnable::default(),
            lifespan: PieceLifespan::WithinPart,
            is_transition: false,
            is_virtual: false,
            ad_lib_source_id: None,
            content: PieceContent::default(),
        }
    }

    pub fn uses_layer(&self, layer: &str) -> bool {
        self.content.timeline_objects.iter().any(|o| o.layer == layer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDuration {
    /// Fin fixée par l'opérateur, relative au groupe du piece
    pub end: i64,
}

/// Rattachement d'une instance à un piece infini
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteInfo {
    /// Partagé par toutes les instances que le piece traverse
    pub infinite_piece_id: String,
    /// PartInstance où le piece a démarré
    pub start_part_instance_id: String,
    /// PartInstance où le piece est plafonné, le cas échéant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_part_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub from_previous_part: bool,
}

/// Occurrence jouée d'un piece, attachée à exactement un PartInstance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceInstance {
    #[serde(rename = "_id")]
    pub id: String,
    pub rundown_id: String,
    pub part_instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_activation_id: Option<String>,
    pub piece: Piece,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_playback: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_playback: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_duration: Option<UserDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infinite: Option<InfiniteInfo>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dynamically_inserted: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reset: bool,
}

impl PieceInstance {
    /// Identifiant déterministe d'une instance de `piece` dans `part_instance_id`
    pub fn id_for(part_instance_id: &str, piece_id: &str) -> String {
        format!("{}_{}", part_instance_id, piece_id)
    }

    /// Enveloppe un piece gabarit dans une instance
    pub fn wrap(piece: &Piece, part_instance_id: &str, activation_id: Option<&str>) -> Self {
        Self {
            id: Self::id_for(part_instance_id, &piece.id),
            rundown_id: piece.rundown_id.clone(),
            part_instance_id: part_instance_id.to_string(),
            playlist_activation_id: activation_id.map(str::to_string),
            piece: piece.clone(),
            started_playback: None,
            stopped_playback: None,
            user_duration: None,
            infinite: None,
            disabled: false,
            dynamically_inserted: false,
            reset: false,
        }
    }

    pub fn infinite_piece_id(&self) -> Option<&str> {
        self.infinite.as_ref().map(|i| i.infinite_piece_id.as_str())
    }

    /// Vrai si ce piece a démarré dans un autre part
    pub fn is_infinite_continuation(&self, part_id: &str) -> bool {
        self.infinite.is_some() && self.piece.start_part_id != part_id
    }
}

impl_document!(Piece, "pieces");
impl_document!(PieceInstance, "pieceInstances");
