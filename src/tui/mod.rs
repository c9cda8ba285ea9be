//! TUI module - Terminal dashboard and session runner with ratatui

use std::io::{Stdout, stdout};
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, Utc};
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState, Tabs},
};
use tracing::{info, warn};

use crate::db::Database;
use crate::error::SessionError;
use crate::exercises::{Exercise, ExerciseFilter};
use crate::session::{ActiveSession, Phase, SessionEvent, SessionSummary, SetResult};
use crate::workouts::{Workout, format_duration};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const REST_STEP_SECS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Workouts,
    Exercises,
    History,
    Session,
}

impl View {
    const ALL: [View; 4] = [View::Workouts, View::Exercises, View::History, View::Session];

    fn title(&self) -> &'static str {
        match self {
            View::Workouts => "Workouts",
            View::Exercises => "Exercises",
            View::History => "History",
            View::Session => "Session",
        }
    }

    fn next(self) -> View {
        let i = View::ALL.iter().position(|v| *v == self).unwrap_or(0);
        View::ALL[(i + 1) % View::ALL.len()]
    }
}

/// App state for TUI
pub struct App {
    db: Database,
    view: View,
    workouts: Vec<Workout>,
    exercises: Vec<Exercise>,
    history: Vec<SessionSummary>,
    table: TableState,
    session: Option<ActiveSession>,
    status: String,
    should_quit: bool,
}

impl App {
    pub fn new(db: Database) -> Result<Self> {
        let session = db.resume_session(Utc::now())?;
        let mut app = Self {
            db,
            view: if session.is_some() { View::Session } else { View::Workouts },
            workouts: Vec::new(),
            exercises: Vec::new(),
            history: Vec::new(),
            table: TableState::default().with_selected(Some(0)),
            session,
            status: String::new(),
            should_quit: false,
        };
        app.refresh()?;
        Ok(app)
    }

    fn refresh(&mut self) -> Result<()> {
        self.workouts = self.db.workouts()?;
        self.exercises = self.db.list_exercises(&ExerciseFilter::default())?;
        self.history = self.db.history(Some(50))?;
        Ok(())
    }

    /// Run the TUI application
    pub fn run(&mut self) -> Result<()> {
        let mut terminal = init_terminal()?;

        let result = self.event_loop(&mut terminal);

        restore_terminal()?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Tui) -> Result<()> {
        while !self.should_quit {
            self.tick()?;
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;
        }
        if let Some(session) = &self.session {
            self.db.save_session(session)?;
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let events = session.catch_up(Utc::now());
        if !events.is_empty() {
            self.on_session_events(&events);
            self.persist_session()?;
        }
        Ok(())
    }

    fn persist_session(&self) -> Result<()> {
        if let Some(session) = &self.session {
            self.db.save_session(session)?;
        }
        Ok(())
    }

    fn on_session_events(&mut self, events: &[SessionEvent]) {
        for event in events {
            let message = match event {
                SessionEvent::RestWarning { remaining } => format!("Get ready: {}s", remaining),
                SessionEvent::RestFinished => "Rest over - go!".to_string(),
                SessionEvent::TimedSetCompleted => "Time! Set complete".to_string(),
                SessionEvent::RestStarted { secs } => format!("Rest {}", format_duration(*secs)),
                SessionEvent::Finished => "Workout complete - press f to save".to_string(),
                SessionEvent::SetCompleted { .. } | SessionEvent::ExerciseChanged { .. } => continue,
            };
            self.status = message;
        }
    }

    fn row_count(&self) -> usize {
        match self.view {
            View::Workouts => self.workouts.len(),
            View::Exercises => self.exercises.len(),
            View::History => self.history.len(),
            View::Session => 0,
        }
    }

    fn select(&mut self, delta: isize) {
        let len = self.row_count();
        if len == 0 {
            self.table.select(None);
            return;
        }
        let current = self.table.selected().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len as isize) as usize;
        self.table.select(Some(next));
    }

    fn switch_view(&mut self, view: View) {
        self.view = view;
        self.table.select(Some(0));
    }

    fn start_selected(&mut self) -> Result<()> {
        let Some(workout) = self.table.selected().and_then(|i| self.workouts.get(i)).cloned() else {
            return Ok(());
        };
        match self.db.begin_session(&workout.id, false, Utc::now()) {
            Ok(session) => {
                info!("TUI started session for {}", workout.name);
                self.session = Some(session);
                self.status = format!("Started {}", workout.name);
                self.switch_view(View::Session);
            }
            Err(e) => match e.downcast_ref::<SessionError>() {
                Some(err) => self.status = err.to_string(),
                None => return Err(e),
            },
        }
        Ok(())
    }

    fn end_session(&mut self, keep: bool) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.db.save_session(&session)?;
        match self.db.end_session(keep, Utc::now())? {
            Some(summary) => {
                self.status = format!(
                    "Saved {} sets in {}",
                    summary.sets.len(),
                    format_duration(summary.duration_secs.min(u32::MAX as u64) as u32)
                );
            }
            None => self.status = "Session discarded".to_string(),
        }
        self.refresh()?;
        self.switch_view(View::History);
        Ok(())
    }

    fn handle_session_key(&mut self, code: KeyCode) -> Result<()> {
        if matches!(code, KeyCode::Char('f')) {
            return self.end_session(true);
        }
        if matches!(code, KeyCode::Char('x')) {
            return self.end_session(false);
        }

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let result = match code {
            KeyCode::Char(' ') | KeyCode::Enter => session.complete_set(SetResult::default()),
            KeyCode::Char('s') => Ok(session.skip_rest()),
            KeyCode::Char('+') => Ok(session.adjust_rest(REST_STEP_SECS)),
            KeyCode::Char('-') => Ok(session.adjust_rest(-REST_STEP_SECS)),
            KeyCode::Char('n') => session.skip_exercise(),
            KeyCode::Char('b') => {
                session.previous_set();
                Ok(Vec::new())
            }
            KeyCode::Char('p') => {
                session.toggle_pause();
                Ok(Vec::new())
            }
            _ => return Ok(()),
        };

        match result {
            Ok(events) => self.on_session_events(&events),
            Err(e) => {
                warn!("Session action rejected: {}", e);
                self.status = e.to_string();
            }
        }
        self.persist_session()
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(250))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Tab => self.switch_view(self.view.next()),
                KeyCode::Char('1') => self.switch_view(View::Workouts),
                KeyCode::Char('2') => self.switch_view(View::Exercises),
                KeyCode::Char('3') => self.switch_view(View::History),
                KeyCode::Char('4') => self.switch_view(View::Session),
                _ if self.view == View::Session => self.handle_session_key(key.code)?,
                KeyCode::Up | KeyCode::Char('k') => self.select(-1),
                KeyCode::Down | KeyCode::Char('j') => self.select(1),
                KeyCode::Char('r') => self.refresh()?,
                KeyCode::Enter if self.view == View::Workouts => self.start_selected()?,
                _ => {}
            }
        }
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(3)])
            .split(area);

        let titles: Vec<String> = View::ALL
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{} {}", i + 1, v.title()))
            .collect();
        let selected = View::ALL.iter().position(|v| *v == self.view).unwrap_or(0);
        let tabs = Tabs::new(titles)
            .select(selected)
            .highlight_style(Style::default().fg(Color::Cyan).bold())
            .block(Block::default().borders(Borders::ALL).title("fitloop"));
        frame.render_widget(tabs, chunks[0]);

        match self.view {
            View::Workouts => self.render_workouts(frame, chunks[1]),
            View::Exercises => self.render_exercises(frame, chunks[1]),
            View::History => self.render_history(frame, chunks[1]),
            View::Session => self.render_session(frame, chunks[1]),
        }

        let keys = match self.view {
            View::Workouts => "q: quit | tab: view | j/k: move | enter: start | r: refresh",
            View::Session => "space: done | s: skip rest | +/-: rest | n: next ex | b: back | p: pause | f: finish | x: abandon",
            _ => "q: quit | tab: view | j/k: move | r: refresh",
        };
        let footer_text = if self.status.is_empty() {
            keys.to_string()
        } else {
            format!("{}  |  {}", self.status, keys)
        };
        let footer = Paragraph::new(footer_text)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(footer, chunks[2]);
    }

    fn render_workouts(&mut self, frame: &mut Frame, area: Rect) {
        let rows: Vec<Row> = self
            .workouts
            .iter()
            .map(|w| {
                Row::new(vec![
                    Cell::from(w.name.clone()),
                    Cell::from(w.exercises.len().to_string()),
                    Cell::from(w.total_sets().to_string()),
                    Cell::from(format!("~{}", format_duration(w.estimated_duration_secs()))),
                    Cell::from(w.description.clone()),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(24),
                Constraint::Length(10),
                Constraint::Length(6),
                Constraint::Length(10),
                Constraint::Min(20),
            ],
        )
        .header(Row::new(vec!["Workout", "Exercises", "Sets", "Time", "Description"]).style(Style::default().bold()))
        .row_highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title("Workouts"));

        frame.render_stateful_widget(table, area, &mut self.table);
    }

    fn render_exercises(&mut self, frame: &mut Frame, area: Rect) {
        let rows: Vec<Row> = self
            .exercises
            .iter()
            .map(|e| {
                Row::new(vec![
                    Cell::from(e.name.clone()),
                    Cell::from(format!("{} x {}", e.default_sets, e.default_set)),
                    Cell::from(e.muscle_summary()),
                    Cell::from(e.notes.clone()),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(24),
                Constraint::Length(20),
                Constraint::Length(30),
                Constraint::Min(20),
            ],
        )
        .header(Row::new(vec!["Exercise", "Default", "Muscles", "Notes"]).style(Style::default().bold()))
        .row_highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title("Exercises"));

        frame.render_stateful_widget(table, area, &mut self.table);
    }

    fn render_history(&mut self, frame: &mut Frame, area: Rect) {
        let rows: Vec<Row> = self
            .history
            .iter()
            .map(|s| {
                Row::new(vec![
                    Cell::from(s.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()),
                    Cell::from(s.workout_name.clone()),
                    Cell::from(s.sets.len().to_string()),
                    Cell::from(format_duration(s.duration_secs.min(u32::MAX as u64) as u32)),
                    Cell::from(if s.completed { "done" } else { "partial" }),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(17),
                Constraint::Length(24),
                Constraint::Length(6),
                Constraint::Length(10),
                Constraint::Min(8),
            ],
        )
        .header(Row::new(vec!["Date", "Workout", "Sets", "Time", "Status"]).style(Style::default().bold()))
        .row_highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title("History"));

        frame.render_stateful_widget(table, area, &mut self.table);
    }

    fn render_session(&self, frame: &mut Frame, area: Rect) {
        let Some(session) = &self.session else {
            let hint = Paragraph::new("No active session. Pick a workout in the Workouts tab and press enter.")
                .block(Block::default().borders(Borders::ALL).title("Session"));
            frame.render_widget(hint, area);
            return;
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(4),
            ])
            .split(area);

        let (done, total) = session.progress();
        let mut lines = vec![Line::from(vec![
            Span::styled(session.workout_name.clone(), Style::default().fg(Color::Cyan).bold()),
            Span::raw(format!(
                "  {}{}",
                format_duration(session.elapsed_secs.min(u32::MAX as u64) as u32),
                if session.paused { "  [paused]" } else { "" }
            )),
        ])];
        if let (Some(ex), Some(set)) = (session.current_exercise(), session.current_set()) {
            let label = if matches!(session.phase, Phase::Resting { .. }) { "Up next" } else { "Now" };
            lines.push(Line::from(format!(
                "{}: {} - set {}/{} ({})",
                label,
                ex.name,
                session.set_index + 1,
                ex.sets.len(),
                set
            )));
        }
        if session.phase == Phase::Working
            && let Some((ex, set)) = session.next_up()
        {
            lines.push(Line::from(format!("Then: {} ({})", ex.name, set)).style(Style::default().fg(Color::DarkGray)));
        }
        frame.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Session")),
            chunks[0],
        );

        let (label, ratio, color) = match session.phase {
            Phase::Resting { remaining, total } => (
                format!("Rest {}", format_duration(remaining)),
                if total > 0 { remaining as f64 / total as f64 } else { 0.0 },
                Color::Yellow,
            ),
            Phase::Working => match (session.timed_set_remaining(), session.current_set()) {
                (Some(left), Some(set)) if set.value > 0 => (
                    format!("{} left", format_duration(left)),
                    left as f64 / set.value as f64,
                    Color::Green,
                ),
                _ => ("Go!".to_string(), 1.0, Color::Green),
            },
            Phase::Finished => ("Finished".to_string(), 1.0, Color::Cyan),
        };
        frame.render_widget(
            Gauge::default()
                .block(Block::default().borders(Borders::ALL).title("Timer"))
                .gauge_style(Style::default().fg(color))
                .label(label)
                .ratio(ratio.clamp(0.0, 1.0)),
            chunks[1],
        );

        frame.render_widget(
            Gauge::default()
                .block(Block::default().borders(Borders::ALL).title("Progress"))
                .gauge_style(Style::default().fg(Color::Cyan))
                .label(format!("{}/{} sets", done, total))
                .ratio(if total > 0 { done as f64 / total as f64 } else { 0.0 }),
            chunks[2],
        );

        let rows: Vec<Row> = session
            .log
            .iter()
            .rev()
            .map(|l| {
                Row::new(vec![
                    Cell::from(l.exercise_name.clone()),
                    Cell::from(format!("#{}", l.set_index + 1)),
                    Cell::from(format!("{}/{}", l.value, l.planned)),
                    Cell::from(l.weight.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string())),
                ])
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(24),
                Constraint::Length(6),
                Constraint::Length(10),
                Constraint::Min(6),
            ],
        )
        .header(Row::new(vec!["Exercise", "Set", "Done/Plan", "Weight"]).style(Style::default().bold()))
        .block(Block::default().borders(Borders::ALL).title("Log"));
        frame.render_widget(table, chunks[3]);
    }
}

fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercises::ExerciseDraft;

    fn app_with_workout() -> App {
        let db = Database::open_in_memory().unwrap();
        db.create_exercise(&ExerciseDraft::new("Push-ups")).unwrap();
        db.create_workout("Quick", "").unwrap();
        db.add_exercise_to_workout("Quick", "Push-ups", None).unwrap();
        App::new(db).unwrap()
    }

    #[test]
    fn test_view_cycle() {
        assert_eq!(View::Workouts.next(), View::Exercises);
        assert_eq!(View::Session.next(), View::Workouts);
    }

    #[test]
    fn test_start_and_finish_from_tui() {
        let mut app = app_with_workout();
        assert_eq!(app.view, View::Workouts);
        app.start_selected().unwrap();
        assert_eq!(app.view, View::Session);
        assert!(app.session.is_some());

        app.handle_session_key(KeyCode::Char(' ')).unwrap();
        assert_eq!(app.db.require_session().unwrap().log.len(), 1);

        app.handle_session_key(KeyCode::Char('f')).unwrap();
        assert!(app.session.is_none());
        assert_eq!(app.history.len(), 1);
        assert_eq!(app.view, View::History);
    }

    #[test]
    fn test_resumes_active_session_on_open() {
        let db = Database::open_in_memory().unwrap();
        db.create_exercise(&ExerciseDraft::new("Plank")).unwrap();
        db.create_workout("Core", "").unwrap();
        db.add_exercise_to_workout("Core", "Plank", None).unwrap();
        db.begin_session("Core", false, Utc::now()).unwrap();

        let app = App::new(db).unwrap();
        assert_eq!(app.view, View::Session);
        assert_eq!(app.session.as_ref().unwrap().workout_name, "Core");
    }

    #[test]
    fn test_selection_wraps() {
        let mut app = app_with_workout();
        app.select(-1);
        assert_eq!(app.table.selected(), Some(0));
        app.switch_view(View::Exercises);
        app.select(1);
        assert_eq!(app.table.selected(), Some(0));
    }
}
