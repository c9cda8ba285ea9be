//! Active workout session - set/rest progression with a seconds timer
//!
//! The session owns a snapshot of the workout taken at start, so editing the
//! workout while a session runs does not disturb it. Time only advances through
//! [`ActiveSession::tick`] (or [`ActiveSession::catch_up`] after a reload).

pub mod history;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use history::{Analytics, SessionSummary};

use crate::error::SessionError;
use crate::exercises::Exercise;
use crate::settings::Settings;
use crate::workouts::{SetType, Workout, WorkoutSet};

/// One exercise of the session plan, with its name resolved at start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedExercise {
    pub exercise_id: String,
    pub name: String,
    pub sets: Vec<WorkoutSet>,
    pub rest_between_sets: u32,
    pub rest_after: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Phase {
    Working,
    Resting { remaining: u32, total: u32 },
    Finished,
}

/// What was actually performed, when it differs from the plan
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SetResult {
    pub value: Option<u32>,
    pub weight: Option<f64>,
}

/// A performed set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetLog {
    pub exercise_id: String,
    pub exercise_name: String,
    pub exercise_index: usize,
    pub set_index: usize,
    #[serde(rename = "type")]
    pub kind: SetType,
    pub planned: u32,
    pub value: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SetCompleted { exercise_index: usize, set_index: usize },
    TimedSetCompleted,
    RestStarted { secs: u32 },
    RestWarning { remaining: u32 },
    RestFinished,
    ExerciseChanged { index: usize },
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub id: String,
    pub workout_id: String,
    pub workout_name: String,
    pub plan: Vec<PlannedExercise>,
    pub exercise_index: usize,
    pub set_index: usize,
    pub phase: Phase,
    /// Total running time, pauses excluded
    pub elapsed_secs: u64,
    /// Time spent on the current set
    pub set_elapsed_secs: u32,
    pub paused: bool,
    pub log: Vec<SetLog>,
    pub auto_complete_timed_sets: bool,
    pub warning_secs: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveSession {
    /// Snapshot `workout` into a new session. Slots without sets are left out.
    pub fn start(
        id: String,
        workout: &Workout,
        exercises: &[Exercise],
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let plan: Vec<PlannedExercise> = workout
            .exercises
            .iter()
            .filter(|slot| !slot.sets.is_empty())
            .map(|slot| PlannedExercise {
                exercise_id: slot.exercise_id.clone(),
                name: exercises
                    .iter()
                    .find(|e| e.id == slot.exercise_id)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| "Unknown exercise".to_string()),
                sets: slot.sets.clone(),
                rest_between_sets: slot.rest_between_sets,
                rest_after: slot.rest_after,
            })
            .collect();

        if plan.is_empty() {
            return Err(SessionError::EmptyWorkout(workout.name.clone()));
        }

        Ok(Self {
            id,
            workout_id: workout.id.clone(),
            workout_name: workout.name.clone(),
            plan,
            exercise_index: 0,
            set_index: 0,
            phase: Phase::Working,
            elapsed_secs: 0,
            set_elapsed_secs: 0,
            paused: false,
            log: Vec::new(),
            auto_complete_timed_sets: settings.auto_complete_timed_sets,
            warning_secs: settings.countdown_warning_secs,
            started_at: now,
            updated_at: now,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn current_exercise(&self) -> Option<&PlannedExercise> {
        self.plan.get(self.exercise_index)
    }

    /// The set being worked on, or the one coming up while resting
    pub fn current_set(&self) -> Option<&WorkoutSet> {
        self.current_exercise()?.sets.get(self.set_index)
    }

    /// The set after the current one
    pub fn next_up(&self) -> Option<(&PlannedExercise, &WorkoutSet)> {
        let (ei, si) = self.position_after(self.exercise_index, self.set_index)?;
        let exercise = &self.plan[ei];
        Some((exercise, &exercise.sets[si]))
    }

    /// Seconds left on a running timed set
    pub fn timed_set_remaining(&self) -> Option<u32> {
        match (self.phase, self.current_set()) {
            (Phase::Working, Some(set)) if set.kind == SetType::Time => {
                Some(set.value.saturating_sub(self.set_elapsed_secs))
            }
            _ => None,
        }
    }

    /// (sets logged, sets planned)
    pub fn progress(&self) -> (usize, usize) {
        let total = self.plan.iter().map(|e| e.sets.len()).sum();
        (self.log.len(), total)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Advance the clock by `secs` seconds
    pub fn tick(&mut self, secs: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let mut left = secs;

        while left > 0 && !self.paused && !self.is_finished() {
            // Nothing to count down on a reps set, take the rest of the time at once
            let idle_reps = self.phase == Phase::Working
                && self.current_set().map(|s| s.kind) == Some(SetType::Reps);
            if idle_reps {
                self.elapsed_secs += left;
                self.set_elapsed_secs = self.set_elapsed_secs.saturating_add(left.min(u32::MAX as u64) as u32);
                break;
            }
            self.step(&mut events);
            left -= 1;
        }
        events
    }

    fn step(&mut self, events: &mut Vec<SessionEvent>) {
        self.elapsed_secs += 1;
        match self.phase {
            Phase::Working => {
                self.set_elapsed_secs = self.set_elapsed_secs.saturating_add(1);
                let target = self.current_set().map(|s| s.value).unwrap_or(0);
                if self.auto_complete_timed_sets && self.set_elapsed_secs >= target {
                    events.push(SessionEvent::TimedSetCompleted);
                    self.record_and_advance(SetResult::default(), events);
                }
            }
            Phase::Resting { remaining: before, total } => {
                let remaining = before.saturating_sub(1);
                if remaining == 0 {
                    self.phase = Phase::Working;
                    events.push(SessionEvent::RestFinished);
                } else {
                    self.phase = Phase::Resting { remaining, total };
                    // A rest that starts inside the warning window warns on its first tick
                    if remaining <= self.warning_secs && (before > self.warning_secs || before == total) {
                        events.push(SessionEvent::RestWarning { remaining });
                    }
                }
            }
            Phase::Finished => {}
        }
    }

    /// Bring the clock up to `now`, e.g. after the session was reloaded.
    /// A paused session only moves its reference point.
    pub fn catch_up(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let delta = (now - self.updated_at).num_seconds();
        if delta <= 0 {
            return Vec::new();
        }
        self.updated_at += Duration::seconds(delta);
        if self.paused {
            return Vec::new();
        }
        self.tick(delta as u64)
    }

    /// Log the current set and move on. Completing during a rest ends the
    /// rest and completes the upcoming set.
    pub fn complete_set(&mut self, actual: SetResult) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        match self.phase {
            Phase::Finished => return Err(SessionError::Finished),
            Phase::Resting { .. } => {
                self.phase = Phase::Working;
                events.push(SessionEvent::RestFinished);
            }
            Phase::Working => {}
        }
        self.record_and_advance(actual, &mut events);
        Ok(events)
    }

    fn record_and_advance(&mut self, actual: SetResult, events: &mut Vec<SessionEvent>) {
        let (ei, si) = (self.exercise_index, self.set_index);
        let Some(exercise) = self.plan.get(ei) else {
            return;
        };
        let Some(planned) = exercise.sets.get(si) else {
            return;
        };

        let entry = SetLog {
            exercise_id: exercise.exercise_id.clone(),
            exercise_name: exercise.name.clone(),
            exercise_index: ei,
            set_index: si,
            kind: planned.kind,
            planned: planned.value,
            value: actual.value.unwrap_or(planned.value),
            weight: actual.weight.or(planned.weight),
            completed_at: self.started_at + Duration::seconds(self.elapsed_secs as i64),
        };
        debug!("Set done: {} #{} -> {}", entry.exercise_name, si + 1, entry.value);

        // Redoing a set after stepping back replaces its entry
        self.log.retain(|l| !(l.exercise_index == ei && l.set_index == si));
        self.log.push(entry);
        events.push(SessionEvent::SetCompleted { exercise_index: ei, set_index: si });
        self.set_elapsed_secs = 0;

        match self.position_after(ei, si) {
            None => {
                self.phase = Phase::Finished;
                events.push(SessionEvent::Finished);
            }
            Some((next_ei, next_si)) => {
                let rest = if next_ei == ei {
                    exercise.rest_between_sets
                } else {
                    exercise.rest_after
                };
                self.exercise_index = next_ei;
                self.set_index = next_si;
                if next_ei != ei {
                    events.push(SessionEvent::ExerciseChanged { index: next_ei });
                }
                if rest > 0 {
                    self.phase = Phase::Resting { remaining: rest, total: rest };
                    events.push(SessionEvent::RestStarted { secs: rest });
                } else {
                    self.phase = Phase::Working;
                }
            }
        }
    }

    pub fn skip_rest(&mut self) -> Vec<SessionEvent> {
        if let Phase::Resting { .. } = self.phase {
            self.phase = Phase::Working;
            self.set_elapsed_secs = 0;
            return vec![SessionEvent::RestFinished];
        }
        Vec::new()
    }

    /// Lengthen or shorten the running rest. Reaching zero ends it.
    pub fn adjust_rest(&mut self, delta: i64) -> Vec<SessionEvent> {
        if let Phase::Resting { remaining: before, total } = self.phase {
            let remaining = (before as i64 + delta).clamp(0, u32::MAX as i64) as u32;
            if remaining == 0 {
                return self.skip_rest();
            }
            self.phase = Phase::Resting { remaining, total: total.max(remaining) };
            if remaining <= self.warning_secs && before > self.warning_secs {
                return vec![SessionEvent::RestWarning { remaining }];
            }
        }
        Vec::new()
    }

    /// Jump to the first set of the next exercise without logging anything
    pub fn skip_exercise(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        self.set_elapsed_secs = 0;
        if self.exercise_index + 1 < self.plan.len() {
            self.exercise_index += 1;
            self.set_index = 0;
            self.phase = Phase::Working;
            Ok(vec![SessionEvent::ExerciseChanged { index: self.exercise_index }])
        } else {
            self.phase = Phase::Finished;
            Ok(vec![SessionEvent::Finished])
        }
    }

    /// Step back one set. From a rest this returns to the set just done;
    /// from a finished session it reopens the last set.
    pub fn previous_set(&mut self) {
        self.set_elapsed_secs = 0;
        match self.phase {
            Phase::Finished => {
                self.phase = Phase::Working;
            }
            Phase::Resting { .. } | Phase::Working => {
                if let Some((ei, si)) = self.position_before(self.exercise_index, self.set_index) {
                    self.exercise_index = ei;
                    self.set_index = si;
                }
                self.phase = Phase::Working;
            }
        }
    }

    /// Wrap up into a history entry
    pub fn finish(&self, id: String, now: DateTime<Utc>) -> SessionSummary {
        let (done, total) = self.progress();
        SessionSummary {
            id,
            workout_id: self.workout_id.clone(),
            workout_name: self.workout_name.clone(),
            started_at: self.started_at,
            finished_at: now,
            duration_secs: self.elapsed_secs,
            sets: self.log.clone(),
            completed: done == total,
        }
    }

    fn position_after(&self, ei: usize, si: usize) -> Option<(usize, usize)> {
        let exercise = self.plan.get(ei)?;
        if si + 1 < exercise.sets.len() {
            Some((ei, si + 1))
        } else if ei + 1 < self.plan.len() {
            Some((ei + 1, 0))
        } else {
            None
        }
    }

    fn position_before(&self, ei: usize, si: usize) -> Option<(usize, usize)> {
        if si > 0 {
            Some((ei, si - 1))
        } else if ei > 0 {
            let prev = &self.plan[ei - 1];
            Some((ei - 1, prev.sets.len().saturating_sub(1)))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::ExerciseDraft;
    use crate::workouts::WorkoutExercise;

    fn exercise(id: &str, name: &str) -> Exercise {
        ExerciseDraft::new(name).into_exercise(id.to_string(), Utc::now())
    }

    fn slot(id: &str, sets: Vec<WorkoutSet>, rest: u32, after: u32) -> WorkoutExercise {
        WorkoutExercise {
            exercise_id: id.to_string(),
            sets,
            rest_between_sets: rest,
            rest_after: after,
        }
    }

    /// push-ups 2x10 (rest 30, after 60), plank 1x20s (after 0), squats 1x15
    fn session() -> ActiveSession {
        let mut w = Workout::new("w".into(), "Test".into(), String::new(), Utc::now());
        w.exercises = vec![
            slot("pu", vec![WorkoutSet::reps(10), WorkoutSet::reps(10)], 30, 60),
            slot("pl", vec![WorkoutSet::timed(20)], 0, 0),
            slot("empty", vec![], 0, 0),
            slot("sq", vec![WorkoutSet::reps(15).with_weight(40.0)], 0, 0),
        ];
        let exercises = vec![exercise("pu", "Push-ups"), exercise("pl", "Plank"), exercise("sq", "Squats")];
        ActiveSession::start("s".into(), &w, &exercises, &Settings::default(), Utc::now()).unwrap()
    }

    #[test]
    fn test_start_skips_empty_slots() {
        let s = session();
        assert_eq!(s.plan.len(), 3);
        assert_eq!(s.current_exercise().unwrap().name, "Push-ups");
        assert_eq!(s.progress(), (0, 4));
        assert_eq!(s.phase, Phase::Working);
    }

    #[test]
    fn test_start_empty_workout_fails() {
        let w = Workout::new("w".into(), "Nothing".into(), String::new(), Utc::now());
        let err = ActiveSession::start("s".into(), &w, &[], &Settings::default(), Utc::now()).unwrap_err();
        assert_eq!(err, SessionError::EmptyWorkout("Nothing".into()));
    }

    #[test]
    fn test_complete_set_enters_rest_between_sets() {
        let mut s = session();
        let events = s.complete_set(SetResult { value: Some(8), weight: None }).unwrap();
        assert_eq!(
            events,
            vec![
                SessionEvent::SetCompleted { exercise_index: 0, set_index: 0 },
                SessionEvent::RestStarted { secs: 30 },
            ]
        );
        assert_eq!(s.phase, Phase::Resting { remaining: 30, total: 30 });
        assert_eq!((s.exercise_index, s.set_index), (0, 1));
        assert_eq!(s.log[0].value, 8);
        assert_eq!(s.log[0].planned, 10);
    }

    #[test]
    fn test_rest_after_exercise_and_warning() {
        let mut s = session();
        s.complete_set(SetResult::default()).unwrap();
        s.skip_rest();
        let events = s.complete_set(SetResult::default()).unwrap();
        assert!(events.contains(&SessionEvent::ExerciseChanged { index: 1 }));
        assert!(events.contains(&SessionEvent::RestStarted { secs: 60 }));

        let events = s.tick(57);
        assert_eq!(events, vec![SessionEvent::RestWarning { remaining: 3 }]);
        let events = s.tick(3);
        assert_eq!(events, vec![SessionEvent::RestFinished]);
        assert_eq!(s.phase, Phase::Working);
        assert_eq!(s.current_exercise().unwrap().name, "Plank");
    }

    #[test]
    fn test_short_rest_warns_on_first_tick() {
        let mut s = session();
        s.plan[0].rest_between_sets = 3;
        s.complete_set(SetResult::default()).unwrap();
        assert_eq!(s.phase, Phase::Resting { remaining: 3, total: 3 });

        assert_eq!(s.tick(1), vec![SessionEvent::RestWarning { remaining: 2 }]);
        assert_eq!(s.tick(1), vec![]);
        assert_eq!(s.tick(1), vec![SessionEvent::RestFinished]);
    }

    #[test]
    fn test_adjust_rest_past_threshold_warns_once() {
        let mut s = session();
        s.complete_set(SetResult::default()).unwrap();
        assert_eq!(s.adjust_rest(-28), vec![SessionEvent::RestWarning { remaining: 2 }]);
        assert_eq!(s.tick(1), vec![]);
        assert_eq!(s.tick(1), vec![SessionEvent::RestFinished]);
    }

    #[test]
    fn test_timed_set_auto_completes() {
        let mut s = session();
        s.complete_set(SetResult::default()).unwrap();
        s.skip_rest();
        s.complete_set(SetResult::default()).unwrap();
        s.skip_rest();

        s.tick(5);
        assert_eq!(s.timed_set_remaining(), Some(15));
        let events = s.tick(15);
        assert_eq!(events[0], SessionEvent::TimedSetCompleted);
        // plank has no rest after, so squats start right away
        assert_eq!(s.phase, Phase::Working);
        assert_eq!(s.current_exercise().unwrap().name, "Squats");
        assert_eq!(s.log.last().unwrap().value, 20);
    }

    #[test]
    fn test_timed_set_without_auto_complete_runs_over() {
        let mut s = session();
        s.auto_complete_timed_sets = false;
        s.skip_exercise().unwrap();
        s.tick(30);
        assert_eq!(s.current_exercise().unwrap().name, "Plank");
        assert_eq!(s.set_elapsed_secs, 30);
        assert_eq!(s.timed_set_remaining(), Some(0));
    }

    #[test]
    fn test_last_set_finishes_and_summary() {
        let mut s = session();
        for _ in 0..4 {
            s.complete_set(SetResult::default()).unwrap();
            s.skip_rest();
        }
        assert!(s.is_finished());
        assert_eq!(s.complete_set(SetResult::default()), Err(SessionError::Finished));
        assert_eq!(s.log.last().unwrap().weight, Some(40.0));

        let summary = s.finish("h".into(), Utc::now());
        assert!(summary.completed);
        assert_eq!(summary.sets.len(), 4);
    }

    #[test]
    fn test_complete_during_rest_completes_upcoming_set() {
        let mut s = session();
        s.complete_set(SetResult::default()).unwrap();
        let events = s.complete_set(SetResult::default()).unwrap();
        assert_eq!(events[0], SessionEvent::RestFinished);
        assert_eq!(s.progress(), (2, 4));
        assert_eq!(s.current_exercise().unwrap().name, "Plank");
    }

    #[test]
    fn test_adjust_rest() {
        let mut s = session();
        s.complete_set(SetResult::default()).unwrap();
        s.adjust_rest(15);
        assert_eq!(s.phase, Phase::Resting { remaining: 45, total: 45 });
        s.adjust_rest(-20);
        assert_eq!(s.phase, Phase::Resting { remaining: 25, total: 45 });
        let events = s.adjust_rest(-100);
        assert_eq!(events, vec![SessionEvent::RestFinished]);
        assert_eq!(s.phase, Phase::Working);
    }

    #[test]
    fn test_skip_exercise_on_last_finishes() {
        let mut s = session();
        s.skip_exercise().unwrap();
        s.skip_exercise().unwrap();
        let events = s.skip_exercise().unwrap();
        assert_eq!(events, vec![SessionEvent::Finished]);
        let summary = s.finish("h".into(), Utc::now());
        assert!(!summary.completed);
        assert!(summary.sets.is_empty());
    }

    #[test]
    fn test_previous_set_and_redo_replaces_log() {
        let mut s = session();
        s.previous_set();
        assert_eq!((s.exercise_index, s.set_index), (0, 0));

        s.complete_set(SetResult { value: Some(6), weight: None }).unwrap();
        s.previous_set();
        assert_eq!(s.phase, Phase::Working);
        assert_eq!((s.exercise_index, s.set_index), (0, 0));

        s.complete_set(SetResult { value: Some(9), weight: None }).unwrap();
        assert_eq!(s.log.len(), 1);
        assert_eq!(s.log[0].value, 9);

        s.skip_exercise().unwrap();
        s.previous_set();
        assert_eq!((s.exercise_index, s.set_index), (0, 1));
    }

    #[test]
    fn test_pause_stops_clock() {
        let mut s = session();
        s.complete_set(SetResult::default()).unwrap();
        s.pause();
        assert!(s.tick(10).is_empty());
        assert_eq!(s.elapsed_secs, 0);
        s.toggle_pause();
        s.tick(10);
        assert_eq!(s.phase, Phase::Resting { remaining: 20, total: 30 });
        assert_eq!(s.elapsed_secs, 10);
    }

    #[test]
    fn test_catch_up_uses_wall_clock() {
        let mut s = session();
        let start = s.updated_at;
        s.complete_set(SetResult::default()).unwrap();
        s.catch_up(start + Duration::seconds(12));
        assert_eq!(s.phase, Phase::Resting { remaining: 18, total: 30 });

        s.pause();
        s.catch_up(start + Duration::seconds(100));
        assert_eq!(s.phase, Phase::Resting { remaining: 18, total: 30 });
        assert_eq!(s.updated_at, start + Duration::seconds(100));
    }

    #[test]
    fn test_next_up() {
        let s = session();
        let (ex, set) = s.next_up().unwrap();
        assert_eq!(ex.name, "Push-ups");
        assert_eq!(set.value, 10);
    }
}
