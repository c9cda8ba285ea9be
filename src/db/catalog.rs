//! Exercise and workout managers on top of the object stores

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use super::{Database, Store, generate_id};
use crate::error::ValidationError;
use crate::exercises::{Exercise, ExerciseDraft, ExerciseFilter, validate_name};
use crate::workouts::{Workout, WorkoutExercise, WorkoutSet};

/// First name in `base`, `fmt(base, 2)`, `fmt(base, 3)`, ... not present in
/// `taken` (case-insensitive)
pub fn unique_name(base: &str, taken: &[String], fmt: impl Fn(&str, usize) -> String) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.eq_ignore_ascii_case(candidate));
    if !is_taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| fmt(base, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Database {
    /// Look up by id first, then by case-insensitive name
    pub fn find_exercise(&self, key: &str) -> Result<Option<Exercise>> {
        if let Some(ex) = self.get::<Exercise>(Store::Exercises, key)? {
            return Ok(Some(ex));
        }
        Ok(self.exercises()?.into_iter().find(|e| same_name(&e.name, key)))
    }

    pub fn require_exercise(&self, key: &str) -> Result<Exercise> {
        self.find_exercise(key)?
            .ok_or_else(|| ValidationError::ExerciseNotFound(key.to_string()).into())
    }

    pub fn list_exercises(&self, filter: &ExerciseFilter) -> Result<Vec<Exercise>> {
        Ok(filter.apply(self.exercises()?))
    }

    pub fn create_exercise(&self, draft: &ExerciseDraft) -> Result<Exercise> {
        let draft = draft.validate()?;
        if self.exercises()?.iter().any(|e| same_name(&e.name, &draft.name)) {
            return Err(ValidationError::DuplicateName(draft.name).into());
        }
        let exercise = draft.into_exercise(generate_id(), Utc::now());
        self.put(Store::Exercises, &exercise.id, &exercise)?;
        info!("Created exercise {} ({})", exercise.name, exercise.id);
        Ok(exercise)
    }

    pub fn update_exercise(&self, id: &str, draft: &ExerciseDraft) -> Result<Exercise> {
        let existing = self
            .get::<Exercise>(Store::Exercises, id)?
            .ok_or_else(|| ValidationError::ExerciseNotFound(id.to_string()))?;
        let draft = draft.validate()?;
        if self
            .exercises()?
            .iter()
            .any(|e| e.id != id && same_name(&e.name, &draft.name))
        {
            return Err(ValidationError::DuplicateName(draft.name).into());
        }

        let mut exercise = draft.into_exercise(existing.id, Utc::now());
        exercise.created_at = existing.created_at;
        self.put(Store::Exercises, &exercise.id, &exercise)?;
        Ok(exercise)
    }

    /// Delete an exercise and drop it from every workout.
    /// Returns the number of workouts that referenced it.
    pub fn delete_exercise(&self, id: &str) -> Result<usize> {
        self.transaction(|db| {
            if !db.delete(Store::Exercises, id)? {
                return Err(ValidationError::ExerciseNotFound(id.to_string()).into());
            }
            let mut touched = 0;
            for mut workout in db.workouts()? {
                let before = workout.exercises.len();
                workout.exercises.retain(|slot| slot.exercise_id != id);
                if workout.exercises.len() != before {
                    workout.updated_at = Utc::now();
                    db.put(Store::Workouts, &workout.id, &workout)?;
                    touched += 1;
                }
            }
            info!("Deleted exercise {} (removed from {} workouts)", id, touched);
            Ok(touched)
        })
    }

    pub fn find_workout(&self, key: &str) -> Result<Option<Workout>> {
        if let Some(w) = self.get::<Workout>(Store::Workouts, key)? {
            return Ok(Some(w));
        }
        Ok(self.workouts()?.into_iter().find(|w| same_name(&w.name, key)))
    }

    pub fn require_workout(&self, key: &str) -> Result<Workout> {
        self.find_workout(key)?
            .ok_or_else(|| ValidationError::WorkoutNotFound(key.to_string()).into())
    }

    /// Workouts whose name or description contains `search`, in creation order
    pub fn list_workouts(&self, search: Option<&str>) -> Result<Vec<Workout>> {
        let workouts = self.workouts()?;
        let q = match search.map(str::trim) {
            Some(q) if !q.is_empty() => q.to_lowercase(),
            _ => return Ok(workouts),
        };
        Ok(workouts
            .into_iter()
            .filter(|w| w.name.to_lowercase().contains(&q) || w.description.to_lowercase().contains(&q))
            .collect())
    }

    pub fn create_workout(&self, name: &str, description: &str) -> Result<Workout> {
        let workout = Workout::new(generate_id(), name.to_string(), description.trim().to_string(), Utc::now());
        self.save_workout(workout)
    }

    /// Validate and store a workout (new or edited)
    pub fn save_workout(&self, mut workout: Workout) -> Result<Workout> {
        workout.name = validate_name(&workout.name)?;
        if self
            .workouts()?
            .iter()
            .any(|w| w.id != workout.id && same_name(&w.name, &workout.name))
        {
            return Err(ValidationError::DuplicateName(workout.name).into());
        }
        for slot in &mut workout.exercises {
            if self.get::<Exercise>(Store::Exercises, &slot.exercise_id)?.is_none() {
                return Err(ValidationError::ExerciseNotFound(slot.exercise_id.clone()).into());
            }
            for set in &slot.sets {
                set.validate()?;
            }
            slot.clamp_rests();
        }
        workout.image_transform = workout.image_transform.normalized();
        workout.updated_at = Utc::now();
        self.put(Store::Workouts, &workout.id, &workout)?;
        info!("Saved workout {} ({})", workout.name, workout.id);
        Ok(workout)
    }

    /// Append an exercise to a workout, with explicit sets or the exercise defaults
    pub fn add_exercise_to_workout(
        &self,
        workout_key: &str,
        exercise_key: &str,
        sets: Option<Vec<WorkoutSet>>,
    ) -> Result<Workout> {
        let mut workout = self.require_workout(workout_key)?;
        let exercise = self.require_exercise(exercise_key)?;
        let settings = self.settings()?;
        let sets = sets.unwrap_or_else(|| exercise.default_plan());
        workout.add_exercise(WorkoutExercise::new(exercise.id, sets, &settings))?;
        self.save_workout(workout)
    }

    pub fn delete_workout(&self, id: &str) -> Result<()> {
        if let Some(active) = self.active_session()?
            && active.workout_id == id
        {
            return Err(ValidationError::WorkoutInUse(active.workout_name).into());
        }
        if !self.delete(Store::Workouts, id)? {
            return Err(ValidationError::WorkoutNotFound(id.to_string()).into());
        }
        info!("Deleted workout {}", id);
        Ok(())
    }

    /// Copy a workout under a fresh id and a " (copy)" style name
    pub fn duplicate_workout(&self, id: &str) -> Result<Workout> {
        let original = self.require_workout(id)?;
        let taken: Vec<String> = self.workouts()?.into_iter().map(|w| w.name).collect();
        let name = unique_name(&format!("{} (copy)", original.name), &taken, |base, n| {
            format!("{} {}", base.trim_end_matches(')'), n) + ")"
        });
        let now = Utc::now();
        self.save_workout(Workout {
            id: generate_id(),
            name,
            created_at: now,
            ..original
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::MuscleGroup;

    fn db_with_exercises(names: &[&str]) -> (Database, Vec<Exercise>) {
        let db = Database::open_in_memory().unwrap();
        let exercises = names
            .iter()
            .map(|n| db.create_exercise(&ExerciseDraft::new(*n)).unwrap())
            .collect();
        (db, exercises)
    }

    fn validation(err: &anyhow::Error) -> Option<&ValidationError> {
        err.downcast_ref::<ValidationError>()
    }

    #[test]
    fn test_unique_name() {
        let taken = vec!["Legs".to_string(), "legs (2)".to_string()];
        assert_eq!(unique_name("Arms", &taken, |b, n| format!("{} ({})", b, n)), "Arms");
        assert_eq!(unique_name("Legs", &taken, |b, n| format!("{} ({})", b, n)), "Legs (3)");
    }

    #[test]
    fn test_create_exercise_rejects_duplicate_name() {
        let (db, _) = db_with_exercises(&["Push-ups"]);
        let err = db.create_exercise(&ExerciseDraft::new("push-ups ")).unwrap_err();
        assert_eq!(validation(&err), Some(&ValidationError::DuplicateName("push-ups".into())));
    }

    #[test]
    fn test_update_exercise_keeps_created_at() {
        let (db, exercises) = db_with_exercises(&["Push-ups", "Squats"]);
        let original = &exercises[0];

        let mut draft = ExerciseDraft::from_exercise(original);
        draft.name = "Diamond push-ups".into();
        draft.muscle_groups = vec![MuscleGroup::Triceps];
        let updated = db.update_exercise(&original.id, &draft).unwrap();
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(db.require_exercise("diamond push-ups").unwrap().id, original.id);

        draft.name = "squats".into();
        assert!(db.update_exercise(&original.id, &draft).is_err());
    }

    #[test]
    fn test_find_by_id_or_name() {
        let (db, exercises) = db_with_exercises(&["Plank"]);
        assert_eq!(db.find_exercise(&exercises[0].id).unwrap().unwrap().name, "Plank");
        assert_eq!(db.find_exercise("PLANK").unwrap().unwrap().id, exercises[0].id);
        assert!(db.find_exercise("nope").unwrap().is_none());
    }

    #[test]
    fn test_delete_exercise_removes_references() {
        let (db, exercises) = db_with_exercises(&["Push-ups", "Squats"]);
        db.create_workout("Morning", "").unwrap();
        db.add_exercise_to_workout("Morning", "Push-ups", None).unwrap();
        db.add_exercise_to_workout("Morning", "Squats", None).unwrap();

        let touched = db.delete_exercise(&exercises[0].id).unwrap();
        assert_eq!(touched, 1);
        let w = db.require_workout("morning").unwrap();
        assert_eq!(w.exercises.len(), 1);
        assert_eq!(w.exercises[0].exercise_id, exercises[1].id);

        let err = db.delete_exercise(&exercises[0].id).unwrap_err();
        assert!(matches!(validation(&err), Some(ValidationError::ExerciseNotFound(_))));
    }

    #[test]
    fn test_add_exercise_uses_defaults_and_settings() {
        let (db, _) = db_with_exercises(&["Squats"]);
        let mut settings = db.settings().unwrap();
        settings.rest_between_sets = 45;
        db.save_settings(&settings).unwrap();

        db.create_workout("Legs", "heavy day").unwrap();
        let w = db.add_exercise_to_workout("Legs", "squats", None).unwrap();
        assert_eq!(w.exercises[0].sets.len(), 3);
        assert_eq!(w.exercises[0].rest_between_sets, 45);

        let w = db
            .add_exercise_to_workout("Legs", "squats", Some(vec![WorkoutSet::reps(5).with_weight(100.0)]))
            .unwrap();
        assert_eq!(w.exercises[1].sets[0].weight, Some(100.0));
    }

    #[test]
    fn test_save_workout_rejects_unknown_exercise() {
        let (db, _) = db_with_exercises(&[]);
        let mut w = db.create_workout("Empty", "").unwrap();
        w.exercises.push(WorkoutExercise {
            exercise_id: "ghost".into(),
            sets: vec![WorkoutSet::reps(5)],
            rest_between_sets: 0,
            rest_after: 0,
        });
        let err = db.save_workout(w).unwrap_err();
        assert!(matches!(validation(&err), Some(ValidationError::ExerciseNotFound(_))));
    }

    #[test]
    fn test_save_workout_clamps_rests() {
        let (db, exercises) = db_with_exercises(&["Plank"]);
        let mut w = db.create_workout("Core", "").unwrap();
        w.exercises.push(WorkoutExercise {
            exercise_id: exercises[0].id.clone(),
            sets: vec![WorkoutSet::timed(30)],
            rest_between_sets: 99_999,
            rest_after: 4_000_000_000,
        });
        db.save_workout(w).unwrap();

        let stored = db.require_workout("core").unwrap();
        assert_eq!(stored.exercises[0].rest_between_sets, crate::workouts::MAX_REST_SECS);
        assert_eq!(stored.exercises[0].rest_after, crate::workouts::MAX_REST_SECS);
    }

    #[test]
    fn test_duplicate_workout_names() {
        let (db, _) = db_with_exercises(&[]);
        let w = db.create_workout("Push day", "").unwrap();
        let copy = db.duplicate_workout(&w.id).unwrap();
        assert_eq!(copy.name, "Push day (copy)");
        assert_ne!(copy.id, w.id);
        let copy2 = db.duplicate_workout(&w.id).unwrap();
        assert_eq!(copy2.name, "Push day (copy 2)");
    }

    #[test]
    fn test_list_workouts_search() {
        let (db, _) = db_with_exercises(&[]);
        db.create_workout("Push day", "chest and arms").unwrap();
        db.create_workout("Leg day", "").unwrap();
        assert_eq!(db.list_workouts(Some("ARMS")).unwrap().len(), 1);
        assert_eq!(db.list_workouts(Some(" ")).unwrap().len(), 2);
        assert!(db.create_workout("leg DAY", "").is_err());
    }
}
