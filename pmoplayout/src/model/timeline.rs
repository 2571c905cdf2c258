//! Objets timeline : les instructions émises vers les périphériques de playout

use super::is_false;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Valeur d'un champ `enable` (start, end, while)
///
/// - un temps en millisecondes (absolu epoch ou relatif au groupe parent)
/// - le littéral `"now"`
/// - une expression symbolique `#<id>.start|.end [+|- n]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEnableValue", into = "RawEnableValue")]
pub enum EnableValue {
    Time(i64),
    Now,
    Expr(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawEnableValue {
    Number(i64),
    Float(f64),
    Text(String),
}

impl From<RawEnableValue> for EnableValue {
    fn from(raw: RawEnableValue) -> Self {
        match raw {
            RawEnableValue::Number(n) => EnableValue::Time(n),
            RawEnableValue::Float(f) => EnableValue::Time(f.round() as i64),
            RawEnableValue::Text(s) if s == "now" => EnableValue::Now,
            RawEnableValue::Text(s) => EnableValue::Expr(s),
        }
    }
}

impl From<EnableValue> for RawEnableValue {
    fn from(value: EnableValue) -> Self {
        match value {
            EnableValue::Time(n) => RawEnableValue::Number(n),
            EnableValue::Now => RawEnableValue::Text("now".to_string()),
            EnableValue::Expr(s) => RawEnableValue::Text(s),
        }
    }
}

impl From<i64> for EnableValue {
    fn from(n: i64) -> Self {
        EnableValue::Time(n)
    }
}

impl EnableValue {
    pub fn expr(s: impl Into<String>) -> Self {
        EnableValue::Expr(s.into())
    }

    pub fn is_now(&self) -> bool {
        matches!(self, EnableValue::Now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEnable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EnableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EnableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub while_: Option<EnableValue>,
    /// Le start a été résolu depuis `"now"`
    #[serde(default, skip_serializing_if = "is_false")]
    pub set_from_now: bool,
}

impl TimelineEnable {
    pub fn start_at(start: impl Into<EnableValue>) -> Self {
        Self {
            start: Some(start.into()),
            ..Default::default()
        }
    }

    pub fn while_(value: EnableValue) -> Self {
        Self {
            while_: Some(value),
            ..Default::default()
        }
    }

    pub fn has_duration_or_end(&self) -> bool {
        self.duration.is_some() || self.end.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineObjectType {
    #[default]
    Rundown,
    Recording,
    Stat,
}

/// Présence d'un objet selon l'état de hold du playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldMode {
    Normal,
    /// Uniquement pendant un hold
    Only,
    /// Exclu pendant un hold
    Except,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineKeyframe {
    #[serde(default)]
    pub id: String,
    pub enable: TimelineEnable,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub preserve_for_lookahead: bool,
}

/// Instruction timeline persistée (une par document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineObject {
    /// `<studioId>_<id>`, clé de stockage
    #[serde(rename = "_id", default)]
    pub internal_id: String,
    pub id: String,
    #[serde(default)]
    pub studio_id: String,
    #[serde(default)]
    pub object_type: TimelineObjectType,
    #[serde(default)]
    pub enable: TimelineEnable,
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub layer: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_lookahead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead_for_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyframes: Vec<TimelineKeyframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_mode: Option<HoldMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TimelineObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    // Champs temporaires exposés au blueprint, jamais persistés
    #[serde(skip)]
    pub piece_instance_id: Option<String>,
    #[serde(skip)]
    pub infinite_piece_id: Option<String>,
}

impl TimelineObject {
    /// Objet minimal sur une couche, à compléter par l'appelant
    pub fn new(id: impl Into<String>, layer: impl Into<String>, enable: TimelineEnable) -> Self {
        Self {
            internal_id: String::new(),
            id: id.into(),
            studio_id: String::new(),
            object_type: TimelineObjectType::Rundown,
            enable,
            priority: 0.0,
            layer: layer.into(),
            is_group: false,
            is_lookahead: false,
            lookahead_for_layer: None,
            in_group: None,
            classes: Vec::new(),
            content: Value::Null,
            keyframes: Vec::new(),
            hold_mode: None,
            children: Vec::new(),
            metadata: None,
            piece_instance_id: None,
            infinite_piece_id: None,
        }
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

impl super::Document for TimelineObject {
    const COLLECTION: &'static str = "timeline";

    fn id(&self) -> &str {
        &self.internal_id
    }
}
