//! Active session and history persistence

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{ACTIVE_SESSION_KEY, Database, Store, generate_id};
use crate::error::SessionError;
use crate::session::{ActiveSession, SessionSummary};

impl Database {
    pub fn active_session(&self) -> Result<Option<ActiveSession>> {
        self.get(Store::ActiveSession, ACTIVE_SESSION_KEY)
    }

    /// The active session, or `SessionError::NoActiveSession`
    pub fn require_session(&self) -> Result<ActiveSession> {
        self.active_session()?
            .ok_or_else(|| SessionError::NoActiveSession.into())
    }

    pub fn save_session(&self, session: &ActiveSession) -> Result<()> {
        self.put(Store::ActiveSession, ACTIVE_SESSION_KEY, session)
    }

    /// Start a session for a workout. Only one session may be active; with
    /// `replace` the running one is discarded.
    pub fn begin_session(&self, workout_key: &str, replace: bool, now: DateTime<Utc>) -> Result<ActiveSession> {
        if let Some(existing) = self.active_session()? {
            if !replace {
                return Err(SessionError::AlreadyActive(existing.workout_name).into());
            }
            info!("Discarding session for {}", existing.workout_name);
        }

        let workout = self.require_workout(workout_key)?;
        let session = ActiveSession::start(generate_id(), &workout, &self.exercises()?, &self.settings()?, now)?;
        self.save_session(&session)?;
        info!("Started session for {} ({} sets)", workout.name, session.progress().1);
        Ok(session)
    }

    /// Load the active session and bring its clock up to `now`
    pub fn resume_session(&self, now: DateTime<Utc>) -> Result<Option<ActiveSession>> {
        let Some(mut session) = self.active_session()? else {
            return Ok(None);
        };
        session.catch_up(now);
        self.save_session(&session)?;
        Ok(Some(session))
    }

    /// Close the active session. With `keep` the summary goes to history.
    pub fn end_session(&self, keep: bool, now: DateTime<Utc>) -> Result<Option<SessionSummary>> {
        let session = self.require_session()?;
        self.transaction(|db| {
            db.delete(Store::ActiveSession, ACTIVE_SESSION_KEY)?;
            if !keep {
                info!("Abandoned session for {}", session.workout_name);
                return Ok(None);
            }
            let summary = session.finish(generate_id(), now);
            db.put(Store::History, &summary.id, &summary)?;
            info!(
                "Finished session for {}: {} sets in {}s",
                summary.workout_name,
                summary.sets.len(),
                summary.duration_secs
            );
            Ok(Some(summary))
        })
    }

    /// Most recent sessions first
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        let mut sessions: Vec<SessionSummary> = self.list(Store::History)?;
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::ExerciseDraft;
    use crate::session::SetResult;
    use chrono::Duration;

    fn db_with_workout() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_exercise(&ExerciseDraft::new("Push-ups")).unwrap();
        db.create_workout("Quick", "").unwrap();
        db.add_exercise_to_workout("Quick", "Push-ups", None).unwrap();
        db
    }

    #[test]
    fn test_single_active_session() {
        let db = db_with_workout();
        db.create_workout("Other", "").unwrap();
        db.add_exercise_to_workout("Other", "Push-ups", None).unwrap();

        db.begin_session("Quick", false, Utc::now()).unwrap();
        let err = db.begin_session("Other", false, Utc::now()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SessionError>(),
            Some(&SessionError::AlreadyActive("Quick".into()))
        );

        let session = db.begin_session("Other", true, Utc::now()).unwrap();
        assert_eq!(session.workout_name, "Other");
        assert_eq!(db.count(Store::ActiveSession).unwrap(), 1);
    }

    #[test]
    fn test_empty_workout_cannot_start() {
        let db = db_with_workout();
        db.create_workout("Blank", "").unwrap();
        let err = db.begin_session("Blank", false, Utc::now()).unwrap_err();
        assert!(matches!(err.downcast_ref::<SessionError>(), Some(SessionError::EmptyWorkout(_))));
        assert!(db.active_session().unwrap().is_none());
    }

    #[test]
    fn test_resume_catches_up() {
        let db = db_with_workout();
        let start = Utc::now();
        let mut session = db.begin_session("Quick", false, start).unwrap();
        session.complete_set(SetResult::default()).unwrap();
        db.save_session(&session).unwrap();

        let resumed = db.resume_session(start + Duration::seconds(20)).unwrap().unwrap();
        assert_eq!(resumed.elapsed_secs, 20);
        assert_eq!(db.require_session().unwrap().elapsed_secs, 20);
    }

    #[test]
    fn test_end_session_keep_and_abandon() {
        let db = db_with_workout();
        let mut session = db.begin_session("Quick", false, Utc::now()).unwrap();
        session.complete_set(SetResult::default()).unwrap();
        db.save_session(&session).unwrap();

        let summary = db.end_session(true, Utc::now()).unwrap().unwrap();
        assert_eq!(summary.sets.len(), 1);
        assert!(!summary.completed);
        assert!(db.active_session().unwrap().is_none());
        assert_eq!(db.history(None).unwrap().len(), 1);

        db.begin_session("Quick", false, Utc::now()).unwrap();
        assert!(db.end_session(false, Utc::now()).unwrap().is_none());
        assert_eq!(db.history(None).unwrap().len(), 1);

        let err = db.end_session(true, Utc::now()).unwrap_err();
        assert_eq!(err.downcast_ref::<SessionError>(), Some(&SessionError::NoActiveSession));
    }

    #[test]
    fn test_active_workout_cannot_be_deleted() {
        let db = db_with_workout();
        let session = db.begin_session("Quick", false, Utc::now()).unwrap();
        assert!(db.delete_workout(&session.workout_id).is_err());
        db.end_session(false, Utc::now()).unwrap();
        db.delete_workout(&session.workout_id).unwrap();
    }
}
