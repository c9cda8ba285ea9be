//! Export/import of the whole library as a flat JSON document
//!
//! The document is `{ "exercises": [...], "workouts": [...], "settings": {...} }`.
//! Import is tolerant: records that don't deserialize are counted and skipped,
//! workouts pointing at unknown exercises get a placeholder exercise.

pub mod ai;
pub mod repair;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::db::catalog::unique_name;
use crate::db::{Database, Store, generate_id};
use crate::error::ImportError;
use crate::exercises::{Exercise, ExerciseDraft, validate_name};
use crate::settings::Settings;
use crate::workouts::Workout;

pub use ai::{AiImport, AiPlan, parse_ai_text, plan_ai_import};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportDocument {
    pub exercises: Vec<Exercise>,
    pub workouts: Vec<Workout>,
    pub settings: Settings,
}

/// How an import treats what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Wipe exercises, workouts and settings first
    Replace,
    /// Keep existing data, skip or rename collisions
    Merge,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub exercises_added: usize,
    pub exercises_skipped: usize,
    pub exercises_synthesized: usize,
    pub workouts_added: usize,
    pub workouts_skipped: usize,
    pub workouts_renamed: usize,
    pub invalid_records: usize,
    pub settings_replaced: bool,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exercises: {} added, {} skipped, {} synthesized; workouts: {} added, {} skipped, {} renamed",
            self.exercises_added,
            self.exercises_skipped,
            self.exercises_synthesized,
            self.workouts_added,
            self.workouts_skipped,
            self.workouts_renamed
        )?;
        if self.invalid_records > 0 {
            write!(f, "; {} invalid records ignored", self.invalid_records)?;
        }
        if self.settings_replaced {
            write!(f, "; settings replaced")?;
        }
        Ok(())
    }
}

/// Parsed document plus how many records had to be dropped
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub document: ExportDocument,
    pub settings_present: bool,
    pub invalid_records: usize,
}

pub fn export_document(db: &Database) -> Result<ExportDocument> {
    Ok(ExportDocument {
        exercises: db.exercises()?,
        workouts: db.workouts()?,
        settings: db.settings()?,
    })
}

/// Write the export document to `path`, returns the number of records written
pub fn export_to_file(db: &Database, path: &Path) -> Result<usize> {
    let doc = export_document(db)?;
    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    let count = doc.exercises.len() + doc.workouts.len();
    info!("Exported {} records to {}", count, path.display());
    Ok(count)
}

/// Parse an export document record by record
pub fn parse_document(text: &str) -> Result<ParsedDocument, ImportError> {
    let root: Value = serde_json::from_str(text).map_err(|e| ImportError::Parse(e.to_string()))?;
    let Value::Object(mut root) = root else {
        return Err(ImportError::Validation("expected a JSON object at the top level".into()));
    };

    let mut parsed = ParsedDocument::default();

    fn records<T: serde::de::DeserializeOwned>(value: Option<Value>, invalid: &mut usize) -> Vec<T> {
        let Some(Value::Array(items)) = value else {
            return Vec::new();
        };
        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Ignoring invalid record: {}", e);
                    *invalid += 1;
                    None
                }
            })
            .collect()
    }

    parsed.document.exercises = records(root.remove("exercises"), &mut parsed.invalid_records);
    parsed.document.workouts = records(root.remove("workouts"), &mut parsed.invalid_records);
    if let Some(settings) = root.remove("settings") {
        match serde_json::from_value(settings) {
            Ok(settings) => {
                parsed.document.settings = settings;
                parsed.settings_present = true;
            }
            Err(e) => {
                warn!("Ignoring invalid settings: {}", e);
                parsed.invalid_records += 1;
            }
        }
    }
    Ok(parsed)
}

pub fn import_from_file(db: &Database, path: &Path, mode: ImportMode) -> Result<ImportReport> {
    let text = std::fs::read_to_string(path).map_err(ImportError::Io)?;
    let parsed = parse_document(&text)?;
    import_document(db, parsed, mode)
}

/// Write a parsed document into the stores in one transaction
pub fn import_document(db: &Database, parsed: ParsedDocument, mode: ImportMode) -> Result<ImportReport> {
    let ParsedDocument { document, settings_present, invalid_records } = parsed;

    db.transaction(|db| {
        let mut report = ImportReport { invalid_records, ..Default::default() };

        if mode == ImportMode::Replace {
            db.clear(Store::Exercises)?;
            db.clear(Store::Workouts)?;
            db.clear(Store::Settings)?;
        }

        let mut known: Vec<Exercise> = db.exercises()?;
        // incoming exercise id -> stored exercise id
        let mut id_map: HashMap<String, String> = HashMap::new();

        for incoming in document.exercises {
            if known.iter().any(|e| e.id == incoming.id) {
                id_map.insert(incoming.id.clone(), incoming.id);
                report.exercises_skipped += 1;
                continue;
            }
            if let Some(existing) = known.iter().find(|e| e.name.eq_ignore_ascii_case(incoming.name.trim())) {
                id_map.insert(incoming.id, existing.id.clone());
                report.exercises_skipped += 1;
                continue;
            }
            let draft = match ExerciseDraft::from_exercise(&incoming).validate() {
                Ok(draft) => draft,
                Err(e) => {
                    warn!("Ignoring exercise '{}': {}", incoming.name, e);
                    report.invalid_records += 1;
                    continue;
                }
            };
            let id = if incoming.id.trim().is_empty() { generate_id() } else { incoming.id.clone() };
            let mut exercise = draft.into_exercise(id, incoming.updated_at);
            exercise.created_at = incoming.created_at;
            db.put(Store::Exercises, &exercise.id, &exercise)?;
            id_map.insert(incoming.id, exercise.id.clone());
            known.push(exercise);
            report.exercises_added += 1;
        }

        let existing_workouts = db.workouts()?;
        let mut existing_ids: HashSet<String> = existing_workouts.iter().map(|w| w.id.clone()).collect();
        let mut taken_names: Vec<String> = existing_workouts.into_iter().map(|w| w.name).collect();

        for mut workout in document.workouts {
            if existing_ids.contains(&workout.id) {
                report.workouts_skipped += 1;
                continue;
            }
            let name = match validate_name(&workout.name) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Ignoring workout '{}': {}", workout.name, e);
                    report.invalid_records += 1;
                    continue;
                }
            };
            workout.name = unique_name(&name, &taken_names, |base, n| format!("{} ({})", base, n));
            if workout.name != name {
                report.workouts_renamed += 1;
            }
            if workout.id.trim().is_empty() {
                workout.id = generate_id();
            }

            for slot in &mut workout.exercises {
                if let Some(mapped) = id_map.get(&slot.exercise_id) {
                    slot.exercise_id = mapped.clone();
                } else if !known.iter().any(|e| e.id == slot.exercise_id) {
                    let placeholder = synthesize_placeholder(&slot.exercise_id, &known);
                    db.put(Store::Exercises, &placeholder.id, &placeholder)?;
                    id_map.insert(slot.exercise_id.clone(), placeholder.id.clone());
                    slot.exercise_id = placeholder.id.clone();
                    known.push(placeholder);
                    report.exercises_synthesized += 1;
                }
                slot.sets.retain(|set| set.validate().is_ok());
                slot.clamp_rests();
            }

            workout.image_transform = workout.image_transform.normalized();
            db.put(Store::Workouts, &workout.id, &workout)?;
            existing_ids.insert(workout.id.clone());
            taken_names.push(workout.name.clone());
            report.workouts_added += 1;
        }

        if settings_present && mode == ImportMode::Replace {
            db.save_settings(&document.settings)?;
            report.settings_replaced = true;
        }

        info!("Import finished: {}", report);
        Ok(report)
    })
}

/// Stand-in for an exercise a workout refers to but nobody defined
fn synthesize_placeholder(missing_id: &str, known: &[Exercise]) -> Exercise {
    let taken: Vec<String> = known.iter().map(|e| e.name.clone()).collect();
    let name = unique_name("Unknown exercise", &taken, |base, n| format!("{} ({})", base, n));
    warn!("Workout references missing exercise {}, created '{}'", missing_id, name);
    let id = if missing_id.trim().is_empty() { generate_id() } else { missing_id.to_string() };
    ExerciseDraft::new(name).into_exercise(id, Utc::now())
}
