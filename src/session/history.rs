//! Finished sessions and training analytics over them

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SetLog;
use crate::workouts::SetType;

/// A finished (or abandoned-but-kept) session, stored in the `history` store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub workout_id: String,
    pub workout_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub sets: Vec<SetLog>,
    /// Every planned set was logged
    pub completed: bool,
}

impl SessionSummary {
    pub fn total_reps(&self) -> u32 {
        self.sets
            .iter()
            .filter(|s| s.kind == SetType::Reps)
            .map(|s| s.value)
            .sum()
    }
}

/// Per-exercise totals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExerciseTotals {
    pub sets: usize,
    pub reps: u32,
    pub timed_secs: u32,
    pub volume: f64,
}

/// Training analytics
pub struct Analytics {
    sessions: Vec<SessionSummary>,
}

impl Analytics {
    pub fn new(sessions: Vec<SessionSummary>) -> Self {
        Self { sessions }
    }

    /// Sets logged under exactly this name (any case), else under names containing it
    fn sets_for(&self, exercise: &str) -> Vec<&SetLog> {
        let needle = exercise.trim().to_lowercase();
        let all = || self.sessions.iter().flat_map(|s| s.sets.iter());
        let exact: Vec<&SetLog> = all().filter(|l| l.exercise_name.to_lowercase() == needle).collect();
        if !exact.is_empty() {
            return exact;
        }
        all().filter(|l| l.exercise_name.to_lowercase().contains(&needle)).collect()
    }

    /// Total volume for an exercise: reps x weight, bodyweight reps count as plain reps
    pub fn total_volume(&self, exercise: &str) -> f64 {
        self.sets_for(exercise)
            .into_iter()
            .filter(|l| l.kind == SetType::Reps)
            .map(|l| l.value as f64 * l.weight.filter(|w| *w > 0.0).unwrap_or(1.0))
            .sum()
    }

    /// Heaviest set, then most reps/seconds
    pub fn best_set(&self, exercise: &str) -> Option<&SetLog> {
        self.sets_for(exercise).into_iter().max_by(|a, b| {
            let wa = a.weight.unwrap_or(0.0);
            let wb = b.weight.unwrap_or(0.0);
            wa.total_cmp(&wb).then(a.value.cmp(&b.value))
        })
    }

    /// Get training frequency (sessions per week)
    pub fn weekly_frequency(&self) -> f64 {
        if self.sessions.len() < 2 {
            return 0.0;
        }

        let dates: Vec<_> = self.sessions.iter().map(|s| s.started_at.date_naive()).collect();
        let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
            return 0.0;
        };
        let days = (*last - *first).num_days() as f64;

        if days == 0.0 {
            return self.sessions.len() as f64;
        }

        (self.sessions.len() as f64 / days) * 7.0
    }

    /// Totals keyed by exercise name
    pub fn exercise_totals(&self) -> BTreeMap<String, ExerciseTotals> {
        let mut totals: BTreeMap<String, ExerciseTotals> = BTreeMap::new();
        for log in self.sessions.iter().flat_map(|s| s.sets.iter()) {
            let entry = totals.entry(log.exercise_name.clone()).or_default();
            entry.sets += 1;
            match log.kind {
                SetType::Reps => {
                    entry.reps += log.value;
                    entry.volume += log.value as f64 * log.weight.filter(|w| *w > 0.0).unwrap_or(1.0);
                }
                SetType::Time => entry.timed_secs += log.value,
            }
        }
        totals
    }

    pub fn total_duration_secs(&self) -> u64 {
        self.sessions.iter().map(|s| s.duration_secs).sum()
    }
}
