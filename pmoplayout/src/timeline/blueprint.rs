//! Point d'extension de personnalisation par émission

use crate::model::{PieceInstance, Studio, TimelineObject};
use serde_json::Value;

/// Informations passées à [`Blueprint::on_timeline_generate`]
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineGenerateContext {
    pub studio_id: String,
    pub playlist_id: String,
    pub rundown_id: String,
    pub current_part_instance_id: String,
    pub now: i64,
}

/// PieceInstance placée dans le temps absolu, si son part a démarré
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPieceInstance {
    pub instance: PieceInstance,
    pub resolved_start: Option<i64>,
    pub resolved_duration: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineGenerateResult {
    /// Liste complète et définitive des objets
    pub timeline: Vec<TimelineObject>,
    pub persistent_state: Option<Value>,
}

/// Personnalisation fournie par l'émission
///
/// Les implémentations sont synchrones et ne voient jamais le cache.
pub trait Blueprint: Send + Sync {
    fn blueprint_id(&self) -> &str;

    fn blueprint_version(&self) -> &str;

    /// Objets émis quand aucun playlist n'est à l'antenne
    fn get_studio_baseline(&self, _studio: &Studio) -> anyhow::Result<Vec<TimelineObject>> {
        Ok(Vec::new())
    }

    fn on_timeline_generate(
        &self,
        _context: &TimelineGenerateContext,
        objects: Vec<TimelineObject>,
        _previous_persistent_state: Option<&Value>,
        _previous_part_end_state: Option<&Value>,
        _resolved_pieces: &[ResolvedPieceInstance],
    ) -> anyhow::Result<TimelineGenerateResult> {
        Ok(TimelineGenerateResult {
            timeline: objects,
            persistent_state: None,
        })
    }
}

/// Blueprint neutre : aucune base studio, timeline inchangé
#[derive(Debug, Clone, Default)]
pub struct DefaultBlueprint;

impl Blueprint for DefaultBlueprint {
    fn blueprint_id(&self) -> &str {
        "default"
    }

    fn blueprint_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }
}
