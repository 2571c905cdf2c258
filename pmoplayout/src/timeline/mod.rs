//! Génération du timeline
//!
//! Le timeline d'un studio est une fonction pure de l'état persisté :
//! - playlist actif : statut, base du rundown, groupes previous / current /
//!   next, infinis, lookahead, puis personnalisation par le blueprint ;
//! - aucun playlist actif : base du studio fournie par le blueprint.
//!
//! Le résultat est aplati, estampillé (`studioId`, `_id`) puis comparé aux
//! objets déjà en cache : seules les différences sont écrites au commit.

mod blueprint;
mod builder;
mod enable;
mod lookahead;
mod pieces;
mod stat;
mod timings;

pub use blueprint::{
    Blueprint, DefaultBlueprint, ResolvedPieceInstance, TimelineGenerateContext,
    TimelineGenerateResult,
};
pub use builder::{build_timeline_objs_for_rundown, part_first_object_id, part_group_id};
pub use enable::{Edge, prefix_all_object_ids, reference, rewrite_references};
pub use lookahead::{LOOKAHEAD_OBJ_PRIORITY, get_lookahead_objects};
pub use pieces::{
    DEFINITELY_ENDED_FUTURE_DURATION, PieceInstanceWithTimings, has_definitely_ended,
    piece_first_object_id, piece_group_id, process_and_prune_piece_instance_timings,
};
pub use stat::{STAT_LAYER, STAT_OBJECT_ID, timeline_hash, update_stat_object};
pub use timings::{part_keepalive_duration, part_overlap_duration, part_target_duration};

use crate::cache::{CacheForPlayout, CacheForStudio, WriteCollection};
use crate::model::{
    EnableValue, Part, PartInstance, Piece, PieceInstance, RundownPlaylist, Studio, TimelineEnable,
    TimelineObject, TimelineObjectType,
};
use crate::playout::ordered_parts;
use crate::{Error, Result, get_current_time};
use serde_json::{Value, json};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Réglages d'horloge du studio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudioClock {
    /// Remplace `"now"` par l'heure courante à chaque génération
    pub force_now_time: bool,
    /// Marge ajoutée à l'heure courante quand `"now"` est forcé
    pub now_safe_latency_ms: i64,
}

impl StudioClock {
    pub fn forced_now(&self, now: i64) -> Option<i64> {
        self.force_now_time.then(|| now + self.now_safe_latency_ms)
    }
}

/// PartInstance sélectionnée et ses PieceInstances
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPart {
    pub instance: PartInstance,
    pub pieces: Vec<PieceInstance>,
}

/// Tout ce dont le builder a besoin, extrait du cache
#[derive(Debug, Clone)]
pub struct TimelineInput {
    pub studio: Studio,
    pub playlist: RundownPlaylist,
    pub previous: Option<SelectedPart>,
    pub current: Option<SelectedPart>,
    pub next: Option<SelectedPart>,
    /// Objets de base du rundown actif (celui du part current, sinon next)
    pub baseline: Vec<TimelineObject>,
    pub ordered_parts: Vec<Part>,
    pub pieces: Vec<Piece>,
    pub now: i64,
}

impl TimelineInput {
    pub fn from_cache(cache: &CacheForPlayout, now: i64) -> Result<Self> {
        let playlist = cache.playlist.doc().clone();

        let select = |instance: &PartInstance| SelectedPart {
            instance: instance.clone(),
            pieces: cache.piece_instances_for(&instance.id),
        };
        let required = |id: &Option<String>| -> Result<Option<SelectedPart>> {
            match id {
                None => Ok(None),
                Some(id) => cache
                    .part_instances
                    .find_one(id)
                    .map(|pi| Some(select(pi)))
                    .ok_or_else(|| Error::not_found("PartInstance", id.clone())),
            }
        };

        let current = required(&playlist.current_part_instance_id)?;
        let next = required(&playlist.next_part_instance_id)?;
        let previous = match &playlist.previous_part_instance_id {
            None => None,
            Some(id) => match cache.part_instances.find_one(id) {
                Some(pi) => Some(select(pi)),
                None => {
                    warn!(playlist_id = %playlist.id, part_instance_id = %id, "Previous PartInstance not found");
                    None
                }
            },
        };

        let active_rundown = current.as_ref().or(next.as_ref()).map(|p| p.instance.rundown_id.clone());
        let baseline = match &active_rundown {
            Some(rundown_id) => cache
                .baseline_objects
                .find(|b| &b.rundown_id == rundown_id)
                .into_iter()
                .flat_map(|b| b.objects.iter().cloned())
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            studio: cache.studio.clone(),
            playlist,
            previous,
            current,
            next,
            baseline,
            ordered_parts: ordered_parts(cache),
            pieces: cache.pieces.iter().cloned().collect(),
            now,
        })
    }
}

fn resolve_pieces(part: &SelectedPart) -> Vec<ResolvedPieceInstance> {
    let part_start = part.instance.last_started_playback();
    part.pieces
        .iter()
        .filter(|p| !p.disabled)
        .map(|p| {
            let start = p.piece.enable.start;
            ResolvedPieceInstance {
                instance: p.clone(),
                resolved_start: p.started_playback.or_else(|| part_start.map(|s| s + start)),
                resolved_duration: p
                    .user_duration
                    .map(|ud| (ud.end - start).max(0))
                    .or(p.piece.enable.duration),
            }
        })
        .collect()
}

/// Timeline complet d'un playlist actif et état persistant renvoyé par le blueprint
///
/// Si `on_timeline_generate` échoue, l'erreur est journalisée et les objets
/// calculés avant l'appel sont conservés.
pub fn get_timeline_rundown(
    input: &TimelineInput,
    blueprint: &dyn Blueprint,
) -> (Vec<TimelineObject>, Option<Value>) {
    let mut objects = build_timeline_objs_for_rundown(input);
    objects.extend(get_lookahead_objects(input));

    let mut persistent_state = None;
    if let Some(current) = &input.current {
        let context = TimelineGenerateContext {
            studio_id: input.studio.id.clone(),
            playlist_id: input.playlist.id.clone(),
            rundown_id: current.instance.rundown_id.clone(),
            current_part_instance_id: current.instance.id.clone(),
            now: input.now,
        };
        let resolved = resolve_pieces(current);
        match blueprint.on_timeline_generate(
            &context,
            objects.clone(),
            input.playlist.previous_persistent_state.as_ref(),
            current.instance.previous_part_end_state.as_ref(),
            &resolved,
        ) {
            Ok(result) => {
                objects = result.timeline;
                persistent_state = result.persistent_state;
            }
            Err(e) => {
                error!(playlist_id = %input.playlist.id, "Error in onTimelineGenerate: {:#}", e);
            }
        }
    }

    for obj in &mut objects {
        obj.object_type = TimelineObjectType::Rundown;
        obj.piece_instance_id = None;
        obj.infinite_piece_id = None;
    }
    (objects, persistent_state)
}

/// Timeline d'un studio sans playlist actif
pub fn get_studio_baseline(studio: &Studio, blueprint: &dyn Blueprint) -> Result<Vec<TimelineObject>> {
    let mut objects = blueprint.get_studio_baseline(studio)?;
    objects.push(
        TimelineObject::new("baseline_version", "baseline_version", TimelineEnable::start_at(0i64))
            .with_content(json!({"deviceType": "abstract"})),
    );
    if let Some(version) = objects.last_mut() {
        version.metadata = Some(json!({
            "versions": {
                "core": env!("CARGO_PKG_VERSION"),
                "blueprintId": blueprint.blueprint_id(),
                "blueprintVersion": blueprint.blueprint_version(),
            }
        }));
    }
    for obj in &mut objects {
        obj.object_type = TimelineObjectType::Rundown;
    }
    Ok(objects)
}

fn flatten_into(studio_id: &str, mut obj: TimelineObject, out: &mut Vec<TimelineObject>) {
    obj.studio_id = studio_id.to_string();
    obj.internal_id = format!("{}_{}", studio_id, obj.id);
    for (i, kf) in obj.keyframes.iter_mut().enumerate() {
        kf.id = format!("{}_keyframe_{}", obj.id, i);
    }
    let children = std::mem::take(&mut obj.children);
    let parent_id = obj.id.clone();
    out.push(obj);
    for mut child in children {
        child.in_group = Some(parent_id.clone());
        flatten_into(studio_id, child, out);
    }
}

/// Aplatit les enfants des groupes et estampille les champs de stockage
pub fn process_timeline_objects(studio_id: &str, objects: Vec<TimelineObject>) -> Vec<TimelineObject> {
    let mut out = Vec::with_capacity(objects.len());
    for obj in objects {
        flatten_into(studio_id, obj, &mut out);
    }
    out
}

/// Remplace chaque start `"now"` par `time`
pub fn set_now_to_time(objects: &mut [TimelineObject], time: i64) {
    for obj in objects {
        if obj.enable.start.as_ref().is_some_and(EnableValue::is_now) {
            obj.enable.start = Some(EnableValue::Time(time));
            obj.enable.set_from_now = true;
        }
    }
}

/// Met en cache les objets du studio, hors objet stat
///
/// Un objet qui revient avec un start `"now"` garde le start déjà résolu.
pub fn save_timeline(
    timeline: &mut WriteCollection<TimelineObject>,
    studio_id: &str,
    objects: Vec<TimelineObject>,
) -> Result<()> {
    let keep: HashSet<String> = objects.iter().map(|o| o.internal_id.clone()).collect();
    let removed = timeline.remove_where(|o| {
        o.studio_id == studio_id && o.object_type != TimelineObjectType::Stat && !keep.contains(&o.internal_id)
    })?;

    for mut obj in objects {
        if obj.enable.start.as_ref().is_some_and(EnableValue::is_now) {
            if let Some(old) = timeline.find_one(&obj.internal_id).filter(|o| o.enable.set_from_now) {
                obj.enable.start = old.enable.start.clone();
                obj.enable.set_from_now = true;
            }
        }
        timeline.replace(obj)?;
    }
    debug!(studio_id, removed, "Timeline objects staged");
    Ok(())
}

fn commit_timeline_objects(
    timeline: &mut WriteCollection<TimelineObject>,
    studio_id: &str,
    objects: Vec<TimelineObject>,
    force_now_to_time: Option<i64>,
    now: i64,
) -> Result<()> {
    let mut objects = process_timeline_objects(studio_id, objects);
    if let Some(time) = force_now_to_time {
        set_now_to_time(&mut objects, time);
    }
    save_timeline(timeline, studio_id, objects)?;
    update_stat_object(timeline, studio_id, now)?;
    Ok(())
}

/// Régénère le timeline du studio d'un playlist
///
/// `force_now_to_time` fixe les starts `"now"` (autonext) ; à défaut,
/// le réglage `force_now_time` du studio s'applique.
pub fn update_timeline(
    cache: &mut CacheForPlayout,
    blueprint: &dyn Blueprint,
    clock: &StudioClock,
    force_now_to_time: Option<i64>,
) -> Result<()> {
    let now = get_current_time();
    let studio_id = cache.studio.id.clone();
    debug!(playlist_id = %cache.playlist_id(), "updateTimeline running");

    let objects = if cache.playlist.is_active() {
        let input = TimelineInput::from_cache(cache, now)?;
        let (objects, persistent_state) = get_timeline_rundown(&input, blueprint);
        if let Some(state) = persistent_state {
            cache.playlist.update(|p| p.previous_persistent_state = Some(state))?;
        }
        objects
    } else {
        get_studio_baseline(&cache.studio, blueprint)?
    };

    let force = force_now_to_time.or_else(|| clock.forced_now(now));
    commit_timeline_objects(&mut cache.timeline, &studio_id, objects, force, now)
}

/// Régénère la base du studio, si aucun playlist n'y est actif
///
/// Retourne `false` quand un playlist actif possède le timeline.
pub fn update_studio_baseline(
    cache: &mut CacheForStudio,
    blueprint: &dyn Blueprint,
    clock: &StudioClock,
) -> Result<bool> {
    let active = cache.get_active_rundown_playlists(None);
    if let Some(playlist) = active.first() {
        debug!(studio_id = %cache.studio.id, playlist_id = %playlist.id, "Studio baseline skipped, playlist active");
        return Ok(false);
    }

    let now = get_current_time();
    let studio_id = cache.studio.id.clone();
    let objects = get_studio_baseline(&cache.studio, blueprint)?;
    commit_timeline_objects(&mut cache.timeline, &studio_id, objects, clock.forced_now(now), now)?;
    Ok(true)
}
