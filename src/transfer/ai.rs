//! Importer for workouts and exercises written by a chat model
//!
//! The text is repaired into JSON first (see [`super::repair`]), then reshaped
//! from whatever field names the model picked into typed drafts. Planning
//! resolves exercise names against the library; nothing is written until
//! [`AiPlan::commit`].

use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::ImportReport;
use super::repair::repair_json;
use crate::db::catalog::unique_name;
use crate::db::{Database, Store, generate_id};
use crate::error::ImportError;
use crate::exercises::{Exercise, ExerciseDraft, MAX_DEFAULT_SETS, MuscleGroup, validate_name};
use crate::workouts::{MAX_REST_SECS, Workout, WorkoutExercise, WorkoutSet};

const NAME_KEYS: &[&str] = &["name", "title", "exercise", "exerciseName", "exercise_name", "movement"];
const MUSCLE_KEYS: &[&str] = &[
    "muscleGroups",
    "muscle_groups",
    "muscles",
    "targetMuscles",
    "target_muscles",
    "primaryMuscles",
    "primary_muscles",
    "muscleGroup",
    "muscle",
    "tags",
];
const NOTE_KEYS: &[&str] = &["notes", "note", "instructions", "description", "tips", "cues"];
const REPS_KEYS: &[&str] = &["reps", "repetitions", "rep", "repsPerSet", "reps_per_set"];
const DURATION_KEYS: &[&str] = &[
    "duration",
    "durationSeconds",
    "duration_seconds",
    "time",
    "seconds",
    "hold",
    "holdSeconds",
];
const WEIGHT_KEYS: &[&str] = &["weight", "weightKg", "weight_kg", "load"];
const REST_KEYS: &[&str] = &[
    "rest",
    "restSeconds",
    "rest_seconds",
    "restBetweenSets",
    "rest_between_sets",
    "restTime",
];
const REST_AFTER_KEYS: &[&str] = &["restAfter", "rest_after", "restAfterExercise", "rest_after_exercise"];
const WORKOUT_LIST_KEYS: &[&str] = &["workouts", "plans", "routines", "sessions"];
const WORKOUT_KEYS: &[&str] = &["workout", "plan", "routine"];
const ENTRY_LIST_KEYS: &[&str] = &["exercises", "items", "movements"];

const FALLBACK_WORKOUT_NAME: &str = "Imported workout";

/// An exercise as described by the model
#[derive(Debug, Clone, PartialEq)]
pub struct AiExercise {
    pub name: String,
    pub muscle_groups: Vec<MuscleGroup>,
    pub notes: String,
    pub default_set: WorkoutSet,
    pub default_sets: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiWorkoutEntry {
    pub exercise: AiExercise,
    pub sets: Vec<WorkoutSet>,
    pub rest_between_sets: Option<u32>,
    pub rest_after: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiWorkout {
    pub name: String,
    pub description: String,
    pub entries: Vec<AiWorkoutEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiImport {
    pub exercises: Vec<AiExercise>,
    pub workouts: Vec<AiWorkout>,
}

/// Repair and reshape model output
pub fn parse_ai_text(text: &str) -> Result<AiImport, ImportError> {
    let value = repair_json(text)?;
    let mut import = AiImport::default();
    collect(&value, &mut import, 0);

    if import.exercises.is_empty() && import.workouts.is_empty() {
        return Err(ImportError::Validation("no exercises or workouts found".into()));
    }
    Ok(import)
}

fn collect(value: &Value, out: &mut AiImport, depth: usize) {
    if depth > 4 {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(obj) if looks_like_workout(obj) => out.workouts.push(parse_workout(obj)),
                    Value::Object(obj) => {
                        if let Some(ex) = parse_exercise(obj) {
                            out.exercises.push(ex);
                        }
                    }
                    Value::String(name) if !name.trim().is_empty() => {
                        out.exercises.push(named_exercise(name.trim().to_string()));
                    }
                    _ => {}
                }
            }
        }
        Value::Object(obj) => {
            let mut matched = false;

            if let Some(Value::Array(items)) = field(obj, WORKOUT_LIST_KEYS) {
                for item in items {
                    if let Value::Object(w) = item {
                        out.workouts.push(parse_workout(w));
                    }
                }
                matched = true;
            }
            if let Some(Value::Object(w)) = field(obj, WORKOUT_KEYS) {
                out.workouts.push(parse_workout(w));
                matched = true;
            }

            if !matched && looks_like_workout(obj) && name_of(obj).is_some() {
                out.workouts.push(parse_workout(obj));
                return;
            }

            // A bare exercise list, or the library next to the workouts
            if let Some(Value::Array(items)) = field(obj, ENTRY_LIST_KEYS) {
                for item in items {
                    match item {
                        Value::Object(e) => {
                            if let Some(ex) = parse_exercise(e) {
                                out.exercises.push(ex);
                            }
                        }
                        Value::String(name) if !name.trim().is_empty() => {
                            out.exercises.push(named_exercise(name.trim().to_string()));
                        }
                        _ => {}
                    }
                }
                matched = true;
            }

            if matched {
                return;
            }
            if let Some(ex) = parse_exercise(obj) {
                out.exercises.push(ex);
                return;
            }
            // Unknown wrapper object: look one level down
            for inner in obj.values() {
                if inner.is_object() || inner.is_array() {
                    collect(inner, out, depth + 1);
                }
            }
        }
        _ => {}
    }
}

fn looks_like_workout(obj: &Map<String, Value>) -> bool {
    matches!(field(obj, ENTRY_LIST_KEYS), Some(Value::Array(_)))
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_of).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

fn name_of(obj: &Map<String, Value>) -> Option<String> {
    NAME_KEYS.iter().find_map(|k| match obj.get(*k)? {
        Value::Object(inner) => name_of(inner),
        other => text_of(other),
    })
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    }
}

fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    field(obj, keys).and_then(number_of)
}

fn duration(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    field(obj, keys).and_then(duration_secs)
}

fn to_count(n: f64) -> u32 {
    if n.is_finite() && n > 0.0 { n.round().min(u32::MAX as f64) as u32 } else { 0 }
}

/// First number in a string: "8-12" -> 8, "20kg" -> 20, "x10" -> 10
pub fn leading_number(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}

/// Seconds from 45, "30s", "1 min", "1.5 minutes", "1:30", "2m"
pub fn duration_secs(value: &Value) -> Option<u32> {
    let text = match value {
        Value::Number(n) => return n.as_f64().map(to_count),
        Value::String(s) => s.trim().to_lowercase(),
        _ => return None,
    };

    if let Some((m, s)) = text.split_once(':') {
        let minutes = leading_number(m)?;
        let seconds = leading_number(s).unwrap_or(0.0);
        return Some(to_count(minutes * 60.0 + seconds));
    }

    let n = leading_number(&text)?;
    let unit = text.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace());
    let factor = if unit.starts_with("h") {
        3600.0
    } else if unit.starts_with("min") || unit == "m" {
        60.0
    } else {
        1.0
    };
    Some(to_count(n * factor))
}

/// Planned set from reps/duration/weight fields, if any are present
fn set_fields(obj: &Map<String, Value>) -> Option<WorkoutSet> {
    let reps = number(obj, REPS_KEYS).map(to_count).filter(|r| *r > 0);
    let secs = duration(obj, DURATION_KEYS).filter(|s| *s > 0);
    let wants_time = field(obj, &["type", "kind"])
        .and_then(Value::as_str)
        .map(|t| matches!(t.to_lowercase().as_str(), "time" | "timed" | "duration" | "hold"))
        .unwrap_or(false);
    let weight = number(obj, WEIGHT_KEYS).filter(|w| w.is_finite() && *w > 0.0);

    let mut set = match (reps, secs) {
        (Some(_), Some(s)) if wants_time => WorkoutSet::timed(s),
        (Some(r), _) => WorkoutSet::reps(r),
        (None, Some(s)) => WorkoutSet::timed(s),
        (None, None) => return weight.map(|w| WorkoutSet::default().with_weight(w)),
    };
    set.weight = weight;
    Some(set)
}

fn muscle_tags(value: &Value) -> Vec<MuscleGroup> {
    match value {
        Value::Array(items) => {
            let tags: Vec<String> = items.iter().filter_map(text_of).collect();
            MuscleGroup::parse_tags(tags.iter().map(String::as_str))
        }
        Value::String(s) => {
            let s = s.replace(" and ", ",");
            MuscleGroup::parse_tags(s.split([',', '/', ';', '&']))
        }
        _ => Vec::new(),
    }
}

fn named_exercise(name: String) -> AiExercise {
    AiExercise {
        name,
        muscle_groups: Vec::new(),
        notes: String::new(),
        default_set: WorkoutSet::default(),
        default_sets: 3,
    }
}

fn parse_exercise(obj: &Map<String, Value>) -> Option<AiExercise> {
    let name = name_of(obj)?;
    // Fields may sit on a nested {"exercise": {...}} object
    let nested = NAME_KEYS.iter().find_map(|k| obj.get(*k)?.as_object());

    let muscle_groups = field(obj, MUSCLE_KEYS)
        .or_else(|| nested.and_then(|n| field(n, MUSCLE_KEYS)))
        .map(muscle_tags)
        .unwrap_or_default();
    let notes = field(obj, NOTE_KEYS)
        .or_else(|| nested.and_then(|n| field(n, NOTE_KEYS)))
        .and_then(text_of)
        .unwrap_or_default();
    let default_set = set_fields(obj).unwrap_or_default();
    let default_sets = match field(obj, &["sets"]) {
        Some(Value::Array(items)) => items.len() as u32,
        Some(v) => number_of(v).map(to_count).unwrap_or(3),
        None => 3,
    }
    .clamp(1, MAX_DEFAULT_SETS);

    Some(AiExercise { name, muscle_groups, notes, default_set, default_sets })
}

fn parse_entry(item: &Value) -> Option<AiWorkoutEntry> {
    let obj = match item {
        Value::String(name) if !name.trim().is_empty() => {
            let exercise = named_exercise(name.trim().to_string());
            return Some(AiWorkoutEntry {
                sets: vec![exercise.default_set.clone(); exercise.default_sets as usize],
                exercise,
                rest_between_sets: None,
                rest_after: None,
            });
        }
        Value::Object(obj) => obj,
        _ => return None,
    };

    let exercise = parse_exercise(obj)?;
    let sets = match field(obj, &["sets"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|s| match s {
                Value::Object(o) => {
                    let mut set = set_fields(o).unwrap_or_else(|| exercise.default_set.clone());
                    if set.weight.is_none() {
                        set.weight = exercise.default_set.weight;
                    }
                    Some(set)
                }
                other => number_of(other)
                    .map(to_count)
                    .filter(|r| *r > 0)
                    .map(|r| WorkoutSet { value: r, ..exercise.default_set.clone() }),
            })
            .collect(),
        _ => vec![exercise.default_set.clone(); exercise.default_sets as usize],
    };

    Some(AiWorkoutEntry {
        rest_between_sets: duration(obj, REST_KEYS),
        rest_after: duration(obj, REST_AFTER_KEYS),
        exercise,
        sets,
    })
}

fn parse_workout(obj: &Map<String, Value>) -> AiWorkout {
    let entries = match field(obj, ENTRY_LIST_KEYS) {
        Some(Value::Array(items)) => items.iter().filter_map(parse_entry).collect(),
        _ => Vec::new(),
    };
    AiWorkout {
        name: name_of(obj).unwrap_or_else(|| FALLBACK_WORKOUT_NAME.to_string()),
        description: field(obj, &["description", "notes", "goal", "summary"])
            .and_then(text_of)
            .unwrap_or_default(),
        entries,
    }
}

/// Records an AI import would write, resolved against the current library
#[derive(Debug, Clone, Default)]
pub struct AiPlan {
    pub exercises: Vec<Exercise>,
    pub workouts: Vec<Workout>,
    pub report: ImportReport,
}

impl AiPlan {
    /// Write the planned records in one transaction
    pub fn commit(&self, db: &Database) -> Result<()> {
        db.transaction(|db| {
            for exercise in &self.exercises {
                db.put(Store::Exercises, &exercise.id, exercise)?;
            }
            for workout in &self.workouts {
                db.put(Store::Workouts, &workout.id, workout)?;
            }
            Ok(())
        })?;
        info!("AI import committed: {}", self.report);
        Ok(())
    }
}

struct Resolver {
    known: Vec<Exercise>,
    created: Vec<Exercise>,
}

impl Resolver {
    /// Id of the exercise with this name, creating it if needed.
    /// The flag tells whether it was created.
    fn resolve(&mut self, ai: &AiExercise) -> Option<(String, bool)> {
        let name = match validate_name(&ai.name) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping exercise '{}': {}", ai.name, e);
                return None;
            }
        };
        if let Some(found) = self
            .known
            .iter()
            .chain(self.created.iter())
            .find(|e| e.name.eq_ignore_ascii_case(&name))
        {
            return Some((found.id.clone(), false));
        }

        let mut draft = ExerciseDraft {
            name,
            muscle_groups: ai.muscle_groups.clone(),
            notes: ai.notes.clone(),
            default_set: ai.default_set.clone(),
            default_sets: ai.default_sets,
            ..Default::default()
        };
        if draft.default_set.validate().is_err() {
            draft.default_set = WorkoutSet::default();
        }
        let draft = draft.validate().ok()?;
        let exercise = draft.into_exercise(generate_id(), Utc::now());
        let id = exercise.id.clone();
        self.created.push(exercise);
        Some((id, true))
    }
}

/// Resolve parsed model output against the library without writing anything
pub fn plan_ai_import(db: &Database, import: &AiImport) -> Result<AiPlan> {
    let settings = db.settings()?;
    let mut resolver = Resolver { known: db.exercises()?, created: Vec::new() };
    let mut report = ImportReport::default();

    for ai in &import.exercises {
        match resolver.resolve(ai) {
            Some((_, true)) => report.exercises_added += 1,
            Some((_, false)) => report.exercises_skipped += 1,
            None => report.invalid_records += 1,
        }
    }

    let mut taken: Vec<String> = db.workouts()?.into_iter().map(|w| w.name).collect();
    let mut workouts = Vec::new();

    for ai in &import.workouts {
        let mut slots = Vec::new();
        for entry in &ai.entries {
            let Some((exercise_id, created)) = resolver.resolve(&entry.exercise) else {
                report.invalid_records += 1;
                continue;
            };
            if created {
                report.exercises_synthesized += 1;
            }
            let mut sets: Vec<WorkoutSet> = entry.sets.iter().filter(|s| s.validate().is_ok()).cloned().collect();
            if sets.is_empty() {
                sets = vec![entry.exercise.default_set.clone()];
                if sets[0].validate().is_err() {
                    sets = vec![WorkoutSet::default()];
                }
            }
            slots.push(WorkoutExercise {
                exercise_id,
                sets,
                rest_between_sets: entry
                    .rest_between_sets
                    .unwrap_or(settings.rest_between_sets)
                    .min(MAX_REST_SECS),
                rest_after: entry.rest_after.unwrap_or(settings.rest_after_exercise).min(MAX_REST_SECS),
            });
        }

        if slots.is_empty() {
            warn!("Skipping workout '{}': no usable exercises", ai.name);
            report.workouts_skipped += 1;
            continue;
        }

        let base = validate_name(&ai.name).unwrap_or_else(|_| FALLBACK_WORKOUT_NAME.to_string());
        let name = unique_name(&base, &taken, |b, n| format!("{} ({})", b, n));
        if name != base {
            report.workouts_renamed += 1;
        }
        taken.push(name.clone());

        let mut workout = Workout::new(generate_id(), name, ai.description.clone(), Utc::now());
        workout.exercises = slots;
        workouts.push(workout);
        report.workouts_added += 1;
    }

    if workouts.is_empty() && report.exercises_added == 0 && report.exercises_skipped == 0 {
        return Err(ImportError::Validation("nothing importable: every workout and exercise was invalid".into()).into());
    }

    Ok(AiPlan { exercises: resolver.created, workouts, report })
}

/// Parse, plan and store model output. With `dry_run` nothing is written.
pub fn apply_ai_import(db: &Database, text: &str, dry_run: bool) -> Result<AiPlan> {
    let import = parse_ai_text(text)?;
    let plan = plan_ai_import(db, &import)?;
    if !dry_run {
        plan.commit(db)?;
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_number_and_durations() {
        assert_eq!(leading_number("8-12"), Some(8.0));
        assert_eq!(leading_number("20.5kg"), Some(20.5));
        assert_eq!(leading_number("AMRAP"), None);

        assert_eq!(duration_secs(&Value::from(45)), Some(45));
        assert_eq!(duration_secs(&Value::from("30s")), Some(30));
        assert_eq!(duration_secs(&Value::from("1 min")), Some(60));
        assert_eq!(duration_secs(&Value::from("1.5 minutes")), Some(90));
        assert_eq!(duration_secs(&Value::from("2m")), Some(120));
        assert_eq!(duration_secs(&Value::from("1:30")), Some(90));
        assert_eq!(duration_secs(&Value::from("90 seconds")), Some(90));
    }

    #[test]
    fn test_parse_single_workout_object() {
        let text = r#"```json
        {
          "title": "Upper body blast",
          "description": "Push focus",
          "exercises": [
            {"name": "Push-ups", "sets": 3, "reps": "8-12", "rest": "45s", "muscles": "chest, triceps"},
            {"exercise": "Plank", "sets": [{"duration": "30s"}, {"duration": 45}]},
            "Burpees",
          ]
        }
        ```"#;
        let import = parse_ai_text(text).unwrap();
        assert!(import.exercises.is_empty());
        let w = &import.workouts[0];
        assert_eq!(w.name, "Upper body blast");
        assert_eq!(w.entries.len(), 3);

        let pushups = &w.entries[0];
        assert_eq!(pushups.sets, vec![WorkoutSet::reps(8); 3]);
        assert_eq!(pushups.rest_between_sets, Some(45));
        assert_eq!(pushups.exercise.muscle_groups, vec![MuscleGroup::Chest, MuscleGroup::Triceps]);

        let plank = &w.entries[1];
        assert_eq!(plank.sets, vec![WorkoutSet::timed(30), WorkoutSet::timed(45)]);

        assert_eq!(w.entries[2].exercise.name, "Burpees");
        assert_eq!(w.entries[2].sets.len(), 3);
    }

    #[test]
    fn test_parse_exercise_library_and_workouts() {
        let text = r#"{
            "exercises": [{"name": "Goblet squat", "targetMuscles": ["quads", "glutes"], "weight": "16kg"}],
            "workouts": [{"name": "Legs", "exercises": [{"name": "Goblet squat", "sets": 4, "reps": 10}]}]
        }"#;
        let import = parse_ai_text(text).unwrap();
        assert_eq!(import.exercises.len(), 1);
        assert_eq!(import.exercises[0].default_set.weight, Some(16.0));
        assert_eq!(import.workouts.len(), 1);
        assert_eq!(import.workouts[0].entries[0].sets.len(), 4);
    }

    #[test]
    fn test_parse_wrapped_and_array_shapes() {
        let wrapped = r#"{"data": {"plan": {"name": "A", "exercises": ["Dips"]}}}"#;
        assert_eq!(parse_ai_text(wrapped).unwrap().workouts[0].name, "A");

        let list = r#"[{"name": "Dips", "reps": 10}, {"name": "Rows", "reps": 12}]"#;
        assert_eq!(parse_ai_text(list).unwrap().exercises.len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_ai_text("I can't help with that."), Err(ImportError::Parse(_))));
        assert!(matches!(parse_ai_text(r#"{"foo": 1}"#), Err(ImportError::Validation(_))));
    }

    #[test]
    fn test_truncated_output_still_imports() {
        let text = r#"{"name": "Cut off", "exercises": [{"name": "Squats", "sets": 3, "reps": 10}, {"name": "Lun"#;
        let import = parse_ai_text(text).unwrap();
        assert_eq!(import.workouts[0].entries.len(), 2);
    }

    #[test]
    fn test_plan_reuses_and_synthesizes() {
        let db = Database::open_in_memory().unwrap();
        db.create_exercise(&ExerciseDraft::new("Push-ups")).unwrap();
        db.create_workout("Legs", "").unwrap();

        let text = r#"{
            "exercises": [{"name": "push-ups"}, {"name": "Lunges", "reps": 12}],
            "workouts": [
                {"name": "Legs", "exercises": [{"name": "Lunges"}, {"name": "Wall sit", "duration": "1 min", "restAfter": 30}]},
                {"name": "Empty", "exercises": []}
            ]
        }"#;
        let plan = apply_ai_import(&db, text, true).unwrap();
        assert_eq!(plan.report.exercises_added, 1);
        assert_eq!(plan.report.exercises_skipped, 1);
        assert_eq!(plan.report.exercises_synthesized, 1);
        assert_eq!(plan.report.workouts_added, 1);
        assert_eq!(plan.report.workouts_skipped, 1);
        assert_eq!(plan.report.workouts_renamed, 1);
        assert_eq!(plan.workouts[0].name, "Legs (2)");
        assert_eq!(plan.workouts[0].exercises[1].rest_after, 30);
        assert_eq!(plan.workouts[0].exercises[1].sets[0], WorkoutSet::timed(60));

        // dry run wrote nothing
        assert_eq!(db.exercises().unwrap().len(), 1);

        apply_ai_import(&db, text, false).unwrap();
        assert_eq!(db.exercises().unwrap().len(), 3);
        let legs = db.require_workout("Legs (2)").unwrap();
        let wall_sit = db.require_exercise("wall sit").unwrap();
        assert_eq!(legs.exercises[1].exercise_id, wall_sit.id);
    }

    #[test]
    fn test_plan_with_nothing_valid_fails() {
        let db = Database::open_in_memory().unwrap();
        let import = AiImport {
            exercises: vec![named_exercise("   ".into())],
            workouts: vec![],
        };
        let err = plan_ai_import(&db, &import).unwrap_err();
        assert!(matches!(err.downcast_ref::<ImportError>(), Some(ImportError::Validation(_))));
    }
}
