//! Exercise definitions - records, form validation and the starter library

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::workouts::{SetType, WorkoutSet};

pub const MAX_NAME_LEN: usize = 80;
pub const MAX_DEFAULT_SETS: u32 = 20;

/// Muscle groups used as exercise tags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MuscleGroup {
    Chest,
    Shoulders,
    Triceps,
    Back,
    Biceps,
    Forearms,
    Core,
    Glutes,
    Quads,
    Hamstrings,
    Calves,
    FullBody,
    Cardio,
}

impl MuscleGroup {
    pub fn label(&self) -> &'static str {
        match self {
            MuscleGroup::Chest => "chest",
            MuscleGroup::Shoulders => "shoulders",
            MuscleGroup::Triceps => "triceps",
            MuscleGroup::Back => "back",
            MuscleGroup::Biceps => "biceps",
            MuscleGroup::Forearms => "forearms",
            MuscleGroup::Core => "core",
            MuscleGroup::Glutes => "glutes",
            MuscleGroup::Quads => "quads",
            MuscleGroup::Hamstrings => "hamstrings",
            MuscleGroup::Calves => "calves",
            MuscleGroup::FullBody => "full body",
            MuscleGroup::Cardio => "cardio",
        }
    }

    /// All muscle groups for iteration
    pub fn all() -> &'static [MuscleGroup] {
        &[
            MuscleGroup::Chest,
            MuscleGroup::Shoulders,
            MuscleGroup::Triceps,
            MuscleGroup::Back,
            MuscleGroup::Biceps,
            MuscleGroup::Forearms,
            MuscleGroup::Core,
            MuscleGroup::Glutes,
            MuscleGroup::Quads,
            MuscleGroup::Hamstrings,
            MuscleGroup::Calves,
            MuscleGroup::FullBody,
            MuscleGroup::Cardio,
        ]
    }

    /// Parse a list of free-form tags, dropping the ones we don't know.
    /// Order of first appearance is kept, duplicates removed.
    pub fn parse_tags<'a, I>(tags: I) -> Vec<MuscleGroup>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut groups = Vec::new();
        for tag in tags {
            match tag.parse::<MuscleGroup>() {
                Ok(group) => {
                    if !groups.contains(&group) {
                        groups.push(group);
                    }
                }
                Err(_) => {
                    if !tag.trim().is_empty() {
                        tracing::warn!("Unknown muscle group tag dropped: {}", tag.trim());
                    }
                }
            }
        }
        groups
    }
}

impl fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MuscleGroup {
    type Err = String;

    /// Case-insensitive, ignores separators, accepts common aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        let group = match key.as_str() {
            "chest" | "pecs" | "pectorals" | "pectoralis" => MuscleGroup::Chest,
            "shoulders" | "shoulder" | "delts" | "deltoids" | "deltoid" => MuscleGroup::Shoulders,
            "triceps" | "tricep" => MuscleGroup::Triceps,
            "back" | "lats" | "upperback" | "lowerback" | "traps" | "rhomboids" => MuscleGroup::Back,
            "biceps" | "bicep" => MuscleGroup::Biceps,
            "forearms" | "forearm" | "grip" => MuscleGroup::Forearms,
            "core" | "abs" | "abdominals" | "obliques" => MuscleGroup::Core,
            "glutes" | "glute" | "hips" => MuscleGroup::Glutes,
            "quads" | "quadriceps" | "legs" | "thighs" => MuscleGroup::Quads,
            "hamstrings" | "hamstring" | "hams" => MuscleGroup::Hamstrings,
            "calves" | "calf" => MuscleGroup::Calves,
            "fullbody" | "full" | "wholebody" | "total" => MuscleGroup::FullBody,
            "cardio" | "conditioning" | "endurance" => MuscleGroup::Cardio,
            _ => return Err(format!("unknown muscle group: {}", s)),
        };
        Ok(group)
    }
}

/// Pan offset and zoom applied to an image when displayed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, scale: 1.0 }
    }
}

impl ImageTransform {
    pub const MIN_SCALE: f64 = 0.1;
    pub const MAX_SCALE: f64 = 10.0;

    /// Non-finite values reset to defaults, scale clamped
    pub fn normalized(self) -> Self {
        let finite_or = |v: f64, d: f64| if v.is_finite() { v } else { d };
        Self {
            x: finite_or(self.x, 0.0),
            y: finite_or(self.y, 0.0),
            scale: finite_or(self.scale, 1.0).clamp(Self::MIN_SCALE, Self::MAX_SCALE),
        }
    }
}

/// Exercise record as stored in the `exercises` store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub muscle_groups: Vec<MuscleGroup>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_transform: ImageTransform,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub default_set: WorkoutSet,
    #[serde(default = "default_sets")]
    pub default_sets: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_sets() -> u32 {
    3
}

impl Exercise {
    /// Planned sets when this exercise is added to a workout
    pub fn default_plan(&self) -> Vec<WorkoutSet> {
        vec![self.default_set.clone(); self.default_sets.max(1) as usize]
    }

    pub fn muscle_summary(&self) -> String {
        self.muscle_groups
            .iter()
            .map(|g| g.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Form state for creating or editing an exercise
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseDraft {
    pub name: String,
    pub muscle_groups: Vec<MuscleGroup>,
    pub image: Option<String>,
    pub image_transform: ImageTransform,
    pub notes: String,
    pub default_set: WorkoutSet,
    pub default_sets: u32,
}

impl Default for ExerciseDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            muscle_groups: Vec::new(),
            image: None,
            image_transform: ImageTransform::default(),
            notes: String::new(),
            default_set: WorkoutSet::default(),
            default_sets: default_sets(),
        }
    }
}

impl ExerciseDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn from_exercise(exercise: &Exercise) -> Self {
        Self {
            name: exercise.name.clone(),
            muscle_groups: exercise.muscle_groups.clone(),
            image: exercise.image.clone(),
            image_transform: exercise.image_transform,
            notes: exercise.notes.clone(),
            default_set: exercise.default_set.clone(),
            default_sets: exercise.default_sets,
        }
    }

    /// Check the form and return a cleaned-up copy
    pub fn validate(&self) -> Result<ExerciseDraft, ValidationError> {
        let name = validate_name(&self.name)?;
        if self.default_sets == 0 || self.default_sets > MAX_DEFAULT_SETS {
            return Err(ValidationError::InvalidSetCount(self.default_sets));
        }
        self.default_set.validate()?;

        let mut muscle_groups = Vec::with_capacity(self.muscle_groups.len());
        for group in &self.muscle_groups {
            if !muscle_groups.contains(group) {
                muscle_groups.push(*group);
            }
        }

        Ok(ExerciseDraft {
            name,
            muscle_groups,
            image: self.image.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            image_transform: self.image_transform.normalized(),
            notes: self.notes.trim().to_string(),
            default_set: self.default_set.clone(),
            default_sets: self.default_sets,
        })
    }

    /// Build a record from an already validated draft
    pub fn into_exercise(self, id: String, now: DateTime<Utc>) -> Exercise {
        Exercise {
            id,
            name: self.name,
            muscle_groups: self.muscle_groups,
            image: self.image,
            image_transform: self.image_transform,
            notes: self.notes,
            default_set: self.default_set,
            default_sets: self.default_sets,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trimmed, non-empty, bounded name
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong(len));
    }
    Ok(name.to_string())
}

/// List filter for the exercise manager
#[derive(Debug, Clone, Default)]
pub struct ExerciseFilter {
    pub search: Option<String>,
    pub muscle: Option<MuscleGroup>,
}

impl ExerciseFilter {
    pub fn matches(&self, exercise: &Exercise) -> bool {
        if let Some(muscle) = self.muscle
            && !exercise.muscle_groups.contains(&muscle)
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                exercise.name.to_lowercase().contains(&q) || exercise.notes.to_lowercase().contains(&q)
            }
            _ => true,
        }
    }

    /// Filter and sort by name
    pub fn apply(&self, exercises: Vec<Exercise>) -> Vec<Exercise> {
        let mut out: Vec<_> = exercises.into_iter().filter(|e| self.matches(e)).collect();
        out.sort_by_key(|e| e.name.to_lowercase());
        out
    }
}

struct Starter {
    name: &'static str,
    muscle_groups: &'static [MuscleGroup],
    kind: SetType,
    value: u32,
    sets: u32,
    notes: &'static str,
}

const STARTER_EXERCISES: &[Starter] = &[
    Starter {
        name: "Push-ups",
        muscle_groups: &[MuscleGroup::Chest, MuscleGroup::Triceps, MuscleGroup::Shoulders, MuscleGroup::Core],
        kind: SetType::Reps,
        value: 12,
        sets: 3,
        notes: "Body in a straight line, chest to the floor",
    },
    Starter {
        name: "Squats",
        muscle_groups: &[MuscleGroup::Quads, MuscleGroup::Glutes, MuscleGroup::Hamstrings],
        kind: SetType::Reps,
        value: 15,
        sets: 3,
        notes: "",
    },
    Starter {
        name: "Plank",
        muscle_groups: &[MuscleGroup::Core, MuscleGroup::Shoulders],
        kind: SetType::Time,
        value: 45,
        sets: 3,
        notes: "Elbows under shoulders",
    },
    Starter {
        name: "Pull-ups",
        muscle_groups: &[MuscleGroup::Back, MuscleGroup::Biceps, MuscleGroup::Forearms],
        kind: SetType::Reps,
        value: 6,
        sets: 3,
        notes: "",
    },
    Starter {
        name: "Lunges",
        muscle_groups: &[MuscleGroup::Quads, MuscleGroup::Glutes],
        kind: SetType::Reps,
        value: 10,
        sets: 3,
        notes: "Reps per leg",
    },
    Starter {
        name: "Calf raises",
        muscle_groups: &[MuscleGroup::Calves],
        kind: SetType::Reps,
        value: 20,
        sets: 2,
        notes: "Full range of motion off a step",
    },
    Starter {
        name: "Jumping jacks",
        muscle_groups: &[MuscleGroup::FullBody, MuscleGroup::Cardio],
        kind: SetType::Time,
        value: 60,
        sets: 1,
        notes: "",
    },
];

/// Drafts for the built-in starter catalogue
pub fn starter_exercises() -> Vec<ExerciseDraft> {
    STARTER_EXERCISES
        .iter()
        .map(|s| ExerciseDraft {
            name: s.name.to_string(),
            muscle_groups: s.muscle_groups.to_vec(),
            notes: s.notes.to_string(),
            default_set: WorkoutSet { kind: s.kind, value: s.value, weight: None },
            default_sets: s.sets,
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(name: &str, groups: &[MuscleGroup], notes: &str) -> Exercise {
        let mut draft = ExerciseDraft::new(name);
        draft.muscle_groups = groups.to_vec();
        draft.notes = notes.to_string();
        draft.into_exercise(name.to_lowercase(), Utc::now())
    }

    #[test]
    fn test_muscle_group_aliases() {
        assert_eq!("Pecs".parse::<MuscleGroup>(), Ok(MuscleGroup::Chest));
        assert_eq!("full_body".parse::<MuscleGroup>(), Ok(MuscleGroup::FullBody));
        assert_eq!("Full Body".parse::<MuscleGroup>(), Ok(MuscleGroup::FullBody));
        assert_eq!("abs".parse::<MuscleGroup>(), Ok(MuscleGroup::Core));
        assert!("spleen".parse::<MuscleGroup>().is_err());
    }

    #[test]
    fn test_parse_tags_drops_unknown_and_duplicates() {
        let groups = MuscleGroup::parse_tags(["chest", "pecs", "wings", "triceps"]);
        assert_eq!(groups, vec![MuscleGroup::Chest, MuscleGroup::Triceps]);
    }

    #[test]
    fn test_validate_trims_and_dedups() {
        let mut draft = ExerciseDraft::new("  Bench press  ");
        draft.muscle_groups = vec![MuscleGroup::Chest, MuscleGroup::Chest];
        draft.image = Some("   ".to_string());
        let clean = draft.validate().unwrap();
        assert_eq!(clean.name, "Bench press");
        assert_eq!(clean.muscle_groups, vec![MuscleGroup::Chest]);
        assert_eq!(clean.image, None);
    }

    #[test]
    fn test_validate_rejects_bad_forms() {
        assert_eq!(ExerciseDraft::new("   ").validate(), Err(ValidationError::EmptyName));

        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            ExerciseDraft::new(long).validate(),
            Err(ValidationError::NameTooLong(MAX_NAME_LEN + 1))
        );

        let mut draft = ExerciseDraft::new("Dips");
        draft.default_sets = 0;
        assert_eq!(draft.validate(), Err(ValidationError::InvalidSetCount(0)));

        let mut draft = ExerciseDraft::new("Dips");
        draft.default_set.value = 0;
        assert_eq!(draft.validate(), Err(ValidationError::ZeroSetValue));
    }

    #[test]
    fn test_image_transform_normalized() {
        let t = ImageTransform { x: f64::NAN, y: 5.0, scale: 50.0 }.normalized();
        assert_eq!(t, ImageTransform { x: 0.0, y: 5.0, scale: ImageTransform::MAX_SCALE });
    }

    #[test]
    fn test_filter_by_search_and_muscle() {
        let all = vec![
            exercise("Squats", &[MuscleGroup::Quads], ""),
            exercise("Bench press", &[MuscleGroup::Chest], "barbell"),
            exercise("Push-ups", &[MuscleGroup::Chest], ""),
        ];

        let filter = ExerciseFilter { search: None, muscle: Some(MuscleGroup::Chest) };
        let names: Vec<_> = filter.apply(all.clone()).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Bench press", "Push-ups"]);

        let filter = ExerciseFilter { search: Some("BARBELL".into()), muscle: None };
        assert_eq!(filter.apply(all).len(), 1);
    }

    #[test]
    fn test_default_plan_repeats_default_set() {
        let mut draft = ExerciseDraft::new("Plank");
        draft.default_set = WorkoutSet { kind: SetType::Time, value: 30, weight: None };
        draft.default_sets = 2;
        let ex = draft.into_exercise("p".into(), Utc::now());
        let plan = ex.default_plan();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].kind, SetType::Time);
    }

    #[test]
    fn test_starter_exercises_are_valid() {
        for draft in starter_exercises() {
            assert!(draft.validate().is_ok(), "{} invalid", draft.name);
        }
    }
}
