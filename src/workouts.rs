//! Workouts - ordered exercises with planned sets and rest intervals

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::exercises::ImageTransform;
use crate::settings::Settings;

/// Upper bound for any rest interval, seconds
pub const MAX_REST_SECS: u32 = 3600;

/// Nominal time per rep used for duration estimates
const SECS_PER_REP: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SetType {
    #[default]
    Reps,
    Time,
}

/// One planned unit of work: `value` reps, or `value` seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSet {
    #[serde(rename = "type", default)]
    pub kind: SetType,
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl Default for WorkoutSet {
    fn default() -> Self {
        Self { kind: SetType::Reps, value: 10, weight: None }
    }
}

impl WorkoutSet {
    pub fn reps(value: u32) -> Self {
        Self { kind: SetType::Reps, value, weight: None }
    }

    pub fn timed(secs: u32) -> Self {
        Self { kind: SetType::Time, value: secs, weight: None }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.value == 0 {
            return Err(ValidationError::ZeroSetValue);
        }
        if let Some(w) = self.weight
            && (!w.is_finite() || w < 0.0)
        {
            return Err(ValidationError::InvalidWeight);
        }
        Ok(())
    }
}

impl fmt::Display for WorkoutSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SetType::Reps => write!(f, "{} reps", self.value)?,
            SetType::Time => write!(f, "{}", format_duration(self.value))?,
        }
        if let Some(w) = self.weight {
            write!(f, " @ {}", w)?;
        }
        Ok(())
    }
}

/// An exercise slot inside a workout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    pub exercise_id: String,
    #[serde(default)]
    pub sets: Vec<WorkoutSet>,
    /// Rest between sets of this exercise
    #[serde(default)]
    pub rest_between_sets: u32,
    /// Rest after the last set, before the next exercise
    #[serde(default)]
    pub rest_after: u32,
}

impl WorkoutExercise {
    pub fn new(exercise_id: impl Into<String>, sets: Vec<WorkoutSet>, settings: &Settings) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            sets,
            rest_between_sets: settings.rest_between_sets.min(MAX_REST_SECS),
            rest_after: settings.rest_after_exercise.min(MAX_REST_SECS),
        }
    }

    /// Pull both rest values into `0..=MAX_REST_SECS`
    pub fn clamp_rests(&mut self) {
        self.rest_between_sets = self.rest_between_sets.min(MAX_REST_SECS);
        self.rest_after = self.rest_after.min(MAX_REST_SECS);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_transform: ImageTransform,
    #[serde(default)]
    pub exercises: Vec<WorkoutExercise>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workout {
    pub fn new(id: String, name: String, description: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            description,
            image: None,
            image_transform: ImageTransform::default(),
            exercises: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }

    pub fn add_exercise(&mut self, slot: WorkoutExercise) -> Result<(), ValidationError> {
        for set in &slot.sets {
            set.validate()?;
        }
        self.exercises.push(slot);
        Ok(())
    }

    pub fn remove_exercise(&mut self, index: usize) -> Result<WorkoutExercise, ValidationError> {
        self.check_index(index)?;
        Ok(self.exercises.remove(index))
    }

    /// Move an exercise slot, shifting the ones in between
    pub fn move_exercise(&mut self, from: usize, to: usize) -> Result<(), ValidationError> {
        self.check_index(from)?;
        self.check_index(to)?;
        let slot = self.exercises.remove(from);
        self.exercises.insert(to, slot);
        Ok(())
    }

    pub fn add_set(&mut self, index: usize, set: WorkoutSet) -> Result<(), ValidationError> {
        self.check_index(index)?;
        set.validate()?;
        self.exercises[index].sets.push(set);
        Ok(())
    }

    pub fn update_set(&mut self, index: usize, set_index: usize, set: WorkoutSet) -> Result<(), ValidationError> {
        self.check_index(index)?;
        set.validate()?;
        let sets = &mut self.exercises[index].sets;
        let len = sets.len();
        let slot = sets
            .get_mut(set_index)
            .ok_or(ValidationError::IndexOutOfRange { index: set_index, len })?;
        *slot = set;
        Ok(())
    }

    pub fn remove_set(&mut self, index: usize, set_index: usize) -> Result<WorkoutSet, ValidationError> {
        self.check_index(index)?;
        let sets = &mut self.exercises[index].sets;
        if set_index >= sets.len() {
            return Err(ValidationError::IndexOutOfRange { index: set_index, len: sets.len() });
        }
        Ok(sets.remove(set_index))
    }

    /// Update rest values of a slot; `None` leaves a value as is
    pub fn set_rest(
        &mut self,
        index: usize,
        between_sets: Option<u32>,
        after: Option<u32>,
    ) -> Result<(), ValidationError> {
        self.check_index(index)?;
        let slot = &mut self.exercises[index];
        if let Some(secs) = between_sets {
            slot.rest_between_sets = secs.min(MAX_REST_SECS);
        }
        if let Some(secs) = after {
            slot.rest_after = secs.min(MAX_REST_SECS);
        }
        Ok(())
    }

    /// Rough duration: work time plus all rests except the trailing one
    pub fn estimated_duration_secs(&self) -> u32 {
        let mut total: u32 = 0;
        let last = self.exercises.len().saturating_sub(1);
        for (i, slot) in self.exercises.iter().enumerate() {
            for set in &slot.sets {
                total = total.saturating_add(match set.kind {
                    SetType::Reps => set.value.saturating_mul(SECS_PER_REP),
                    SetType::Time => set.value,
                });
            }
            let gaps = u32::try_from(slot.sets.len().saturating_sub(1)).unwrap_or(u32::MAX);
            total = total.saturating_add(slot.rest_between_sets.saturating_mul(gaps));
            if i < last {
                total = total.saturating_add(slot.rest_after);
            }
        }
        total
    }

    fn check_index(&self, index: usize) -> Result<(), ValidationError> {
        if index >= self.exercises.len() {
            return Err(ValidationError::IndexOutOfRange { index, len: self.exercises.len() });
        }
        Ok(())
    }
}

/// Format duration in seconds to human-readable string
pub fn format_duration(secs: u32) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}m {}s", secs / 60, secs % 60)
        }
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: &str, sets: Vec<WorkoutSet>, rest: u32, after: u32) -> WorkoutExercise {
        WorkoutExercise {
            exercise_id: id.to_string(),
            sets,
            rest_between_sets: rest,
            rest_after: after,
        }
    }

    fn workout() -> Workout {
        let mut w = Workout::new("w1".into(), "Full body".into(), String::new(), Utc::now());
        w.exercises.push(slot("a", vec![WorkoutSet::reps(10), WorkoutSet::reps(10)], 30, 60));
        w.exercises.push(slot("b", vec![WorkoutSet::timed(45)], 0, 90));
        w.exercises.push(slot("c", vec![WorkoutSet::reps(5)], 0, 120));
        w
    }

    #[test]
    fn test_set_serializes_type_field() {
        let json = serde_json::to_value(WorkoutSet::timed(30)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "time", "value": 30}));

        let set: WorkoutSet = serde_json::from_str(r#"{"type":"reps","value":8,"weight":20.5}"#).unwrap();
        assert_eq!(set, WorkoutSet::reps(8).with_weight(20.5));
    }

    #[test]
    fn test_set_validation() {
        assert_eq!(WorkoutSet::reps(0).validate(), Err(ValidationError::ZeroSetValue));
        assert_eq!(WorkoutSet::reps(5).with_weight(-1.0).validate(), Err(ValidationError::InvalidWeight));
        assert!(WorkoutSet::reps(5).with_weight(0.0).validate().is_ok());
    }

    #[test]
    fn test_move_exercise() {
        let mut w = workout();
        w.move_exercise(0, 2).unwrap();
        let ids: Vec<_> = w.exercises.iter().map(|e| e.exercise_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(
            w.move_exercise(0, 3),
            Err(ValidationError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_set_editing() {
        let mut w = workout();
        w.add_set(1, WorkoutSet::timed(30)).unwrap();
        assert_eq!(w.exercises[1].sets.len(), 2);
        w.update_set(0, 1, WorkoutSet::reps(12)).unwrap();
        assert_eq!(w.exercises[0].sets[1].value, 12);
        assert!(w.update_set(0, 5, WorkoutSet::reps(12)).is_err());
        assert_eq!(w.remove_set(2, 0).unwrap(), WorkoutSet::reps(5));
        assert!(w.remove_set(2, 0).is_err());
    }

    #[test]
    fn test_rest_is_clamped() {
        let mut w = workout();
        w.set_rest(0, Some(10_000), None).unwrap();
        assert_eq!(w.exercises[0].rest_between_sets, MAX_REST_SECS);
        assert_eq!(w.exercises[0].rest_after, 60);
    }

    #[test]
    fn test_estimated_duration() {
        let w = workout();
        // a: 2x10 reps = 60s + 30 rest + 60 after
        // b: 45s + 90 after
        // c: 15s, trailing rest excluded
        assert_eq!(w.estimated_duration_secs(), 60 + 30 + 60 + 45 + 90 + 15);
        assert_eq!(w.total_sets(), 4);
    }

    #[test]
    fn test_estimated_duration_saturates() {
        let mut w = workout();
        w.exercises.push(slot("d", vec![WorkoutSet::reps(2_000_000_000), WorkoutSet::timed(u32::MAX)], u32::MAX, 0));
        assert_eq!(w.estimated_duration_secs(), u32::MAX);
    }

    #[test]
    fn test_clamp_rests() {
        let mut s = slot("a", vec![WorkoutSet::reps(5)], 99_999, 4_000_000_000);
        s.clamp_rests();
        assert_eq!((s.rest_between_sets, s.rest_after), (MAX_REST_SECS, MAX_REST_SECS));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(120), "2m");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3720), "1h 2m");
    }
}
