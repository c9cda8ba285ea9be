//! fitloop - local workout tracker

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fitloop::db::Database;
use fitloop::exercises::{ExerciseDraft, ExerciseFilter, MuscleGroup, starter_exercises};
use fitloop::session::{ActiveSession, Analytics, Phase, SetResult};
use fitloop::settings::WeightUnit;
use fitloop::transfer::{self, ImportMode};
use fitloop::tui::App;
use fitloop::workouts::{WorkoutSet, format_duration};

#[derive(Parser)]
#[command(name = "fitloop")]
#[command(author, version, about = "Local workout tracker: exercises, workouts and timed sessions")]
struct Cli {
    /// Database file
    #[arg(long, global = true, env = "FITLOOP_DB", default_value = "fitloop.db")]
    db: String,

    /// Log filter (e.g. "info", "fitloop=debug")
    #[arg(long, global = true, env = "FITLOOP_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open TUI dashboard
    Tui,

    /// Create the database, optionally with a starter set of exercises
    Init {
        #[arg(long)]
        seed: bool,
    },

    /// Manage exercises
    #[command(subcommand)]
    Exercise(ExerciseCmd),

    /// Manage workouts
    #[command(subcommand)]
    Workout(WorkoutCmd),

    /// Run the active workout session
    #[command(subcommand)]
    Session(SessionCmd),

    /// List finished sessions
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show training statistics
    Stats {
        /// Filter by exercise name
        exercise: Option<String>,
    },

    /// Write exercises, workouts and settings to a JSON file
    Export { path: PathBuf },

    /// Read a JSON file written by `export`
    Import {
        path: PathBuf,
        /// Keep existing data and skip duplicates instead of replacing everything
        #[arg(long)]
        merge: bool,
    },

    /// Import workouts/exercises from AI-generated text ("-" reads stdin)
    ImportAi {
        path: PathBuf,
        /// Show what would be imported without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or change preferences
    #[command(subcommand)]
    Settings(SettingsCmd),
}

#[derive(Args)]
struct SetArgs {
    /// Repetitions per set
    #[arg(short, long, conflicts_with = "time")]
    reps: Option<u32>,

    /// Seconds per set (timed exercise)
    #[arg(short, long)]
    time: Option<u32>,

    /// Weight per set
    #[arg(short, long)]
    weight: Option<f64>,
}

impl SetArgs {
    fn to_set(&self) -> Option<WorkoutSet> {
        let mut set = match (self.reps, self.time) {
            (Some(r), _) => WorkoutSet::reps(r),
            (None, Some(t)) => WorkoutSet::timed(t),
            (None, None) => return self.weight.map(|w| WorkoutSet::default().with_weight(w)),
        };
        set.weight = self.weight;
        Some(set)
    }
}

#[derive(Subcommand)]
enum ExerciseCmd {
    /// Add an exercise
    Add {
        name: String,
        /// Muscle group tags (repeat or comma-separate)
        #[arg(short, long, value_delimiter = ',')]
        muscle: Vec<String>,
        #[arg(short, long)]
        notes: Option<String>,
        /// Default number of sets
        #[arg(short, long, default_value = "3")]
        sets: u32,
        #[command(flatten)]
        set: SetArgs,
        /// Image path or URL
        #[arg(long)]
        image: Option<String>,
    },

    /// List exercises
    List {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        muscle: Option<String>,
    },

    /// Show one exercise
    Show { exercise: String },

    /// Edit an exercise (by id or name)
    Edit {
        exercise: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long, value_delimiter = ',')]
        muscle: Option<Vec<String>>,
        #[arg(short, long)]
        notes: Option<String>,
        #[arg(short, long)]
        sets: Option<u32>,
        #[command(flatten)]
        set: SetArgs,
        #[arg(long)]
        image: Option<String>,
    },

    /// Delete an exercise and remove it from all workouts
    Delete { exercise: String },
}

#[derive(Subcommand)]
enum WorkoutCmd {
    /// Create an empty workout
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List workouts
    List {
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show a workout with its exercises
    Show { workout: String },

    /// Append an exercise to a workout
    Add {
        workout: String,
        exercise: String,
        /// Number of sets (defaults to the exercise's)
        #[arg(short, long)]
        sets: Option<u32>,
        #[command(flatten)]
        set: SetArgs,
        /// Rest between sets, seconds
        #[arg(long)]
        rest: Option<u32>,
        /// Rest after the exercise, seconds
        #[arg(long)]
        rest_after: Option<u32>,
    },

    /// Remove the exercise at a position (1-based)
    Remove { workout: String, position: usize },

    /// Move an exercise from one position to another (1-based)
    Move { workout: String, from: usize, to: usize },

    /// Change rest intervals of the exercise at a position (1-based)
    Rest {
        workout: String,
        position: usize,
        #[arg(long)]
        between: Option<u32>,
        #[arg(long)]
        after: Option<u32>,
    },

    /// Copy a workout
    Duplicate { workout: String },

    /// Delete a workout
    Delete { workout: String },
}

#[derive(Subcommand)]
enum SessionCmd {
    /// Start a workout
    Start {
        workout: String,
        /// Discard a session that is already running
        #[arg(long)]
        replace: bool,
    },
    /// Show the running session
    Status,
    /// Complete the current set, optionally with what was actually done
    Done {
        /// Reps or seconds actually performed
        #[arg(short, long)]
        value: Option<u32>,
        #[arg(short, long)]
        weight: Option<f64>,
    },
    /// End the current rest early
    SkipRest,
    /// Add (or with a negative value remove) rest seconds
    Rest {
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
    /// Move on to the next exercise
    Skip,
    /// Go back one set
    Back,
    Pause,
    Resume,
    /// Finish and save to history
    Finish,
    /// Stop without saving
    Abandon,
}

#[derive(Subcommand)]
enum SettingsCmd {
    Show,
    Set {
        #[arg(long)]
        rest_between_sets: Option<u32>,
        #[arg(long)]
        rest_after_exercise: Option<u32>,
        #[arg(long)]
        unit: Option<WeightUnit>,
        #[arg(long)]
        auto_complete_timed_sets: Option<bool>,
        #[arg(long)]
        countdown_warning: Option<u32>,
    },
}

fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let db = Database::open(&cli.db)?;

    match cli.command {
        Some(Commands::Tui) | None => {
            let mut app = App::new(db)?;
            app.run()?;
        }

        Some(Commands::Init { seed }) => {
            println!("Database: {}", cli.db);
            if seed {
                let mut added = 0;
                for draft in starter_exercises() {
                    if db.find_exercise(&draft.name)?.is_none() {
                        db.create_exercise(&draft)?;
                        added += 1;
                    }
                }
                println!("Added {} starter exercises", added);
            }
        }

        Some(Commands::Exercise(cmd)) => exercise_cmd(&db, cmd)?,
        Some(Commands::Workout(cmd)) => workout_cmd(&db, cmd)?,
        Some(Commands::Session(cmd)) => session_cmd(&db, cmd)?,

        Some(Commands::History { limit }) => {
            let sessions = db.history(Some(limit))?;
            println!("Recent sessions:");
            println!("{:-<70}", "");
            for s in sessions {
                println!(
                    "{} | {:24} | {:>3} sets | {:>8} | {}",
                    s.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    s.workout_name,
                    s.sets.len(),
                    format_duration(s.duration_secs.min(u32::MAX as u64) as u32),
                    if s.completed { "done" } else { "partial" }
                );
            }
        }

        Some(Commands::Stats { exercise }) => {
            let analytics = Analytics::new(db.history(None)?);
            let unit = db.settings()?.weight_unit;

            println!("Training Statistics");
            println!("{:-<40}", "");

            if let Some(ex) = exercise {
                println!("Exercise: {}", ex);
                println!("Total volume: {:.1}", analytics.total_volume(&ex));
                if let Some(best) = analytics.best_set(&ex) {
                    match best.weight {
                        Some(w) => println!("Best set: {} x {} {}", best.value, w, unit),
                        None => println!("Best set: {}", best.value),
                    }
                }
            } else {
                println!("Weekly frequency: {:.1} sessions/week", analytics.weekly_frequency());
                println!(
                    "Total time: {}",
                    format_duration(analytics.total_duration_secs().min(u32::MAX as u64) as u32)
                );
                for (name, t) in analytics.exercise_totals() {
                    println!(
                        "{:24} {:>3} sets | {:>5} reps | {:>6} | vol {:.0}",
                        name,
                        t.sets,
                        t.reps,
                        format_duration(t.timed_secs),
                        t.volume
                    );
                }
            }
        }

        Some(Commands::Export { path }) => {
            let count = transfer::export_to_file(&db, &path)?;
            println!("Exported {} records to {}", count, path.display());
        }

        Some(Commands::Import { path, merge }) => {
            let mode = if merge { ImportMode::Merge } else { ImportMode::Replace };
            let report = transfer::import_from_file(&db, &path, mode)?;
            println!("Imported: {}", report);
        }

        Some(Commands::ImportAi { path, dry_run }) => {
            let text = if path.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?
            };
            let plan = transfer::ai::apply_ai_import(&db, &text, dry_run)?;
            for w in &plan.workouts {
                println!("Workout: {} ({} exercises, {} sets)", w.name, w.exercises.len(), w.total_sets());
            }
            for e in &plan.exercises {
                println!("New exercise: {}", e.name);
            }
            println!("{}{}", if dry_run { "Would import: " } else { "Imported: " }, plan.report);
        }

        Some(Commands::Settings(SettingsCmd::Show)) => {
            println!("{}", serde_json::to_string_pretty(&db.settings()?)?);
        }

        Some(Commands::Settings(SettingsCmd::Set {
            rest_between_sets,
            rest_after_exercise,
            unit,
            auto_complete_timed_sets,
            countdown_warning,
        })) => {
            let mut settings = db.settings()?;
            if let Some(v) = rest_between_sets {
                settings.rest_between_sets = v;
            }
            if let Some(v) = rest_after_exercise {
                settings.rest_after_exercise = v;
            }
            if let Some(v) = unit {
                settings.weight_unit = v;
            }
            if let Some(v) = auto_complete_timed_sets {
                settings.auto_complete_timed_sets = v;
            }
            if let Some(v) = countdown_warning {
                settings.countdown_warning_secs = v;
            }
            db.save_settings(&settings)?;
            println!("Settings saved");
        }
    }

    Ok(())
}

fn parse_muscles(tags: &[String]) -> Vec<MuscleGroup> {
    MuscleGroup::parse_tags(tags.iter().map(String::as_str))
}

fn exercise_cmd(db: &Database, cmd: ExerciseCmd) -> Result<()> {
    match cmd {
        ExerciseCmd::Add { name, muscle, notes, sets, set, image } => {
            let draft = ExerciseDraft {
                name,
                muscle_groups: parse_muscles(&muscle),
                image,
                notes: notes.unwrap_or_default(),
                default_set: set.to_set().unwrap_or_default(),
                default_sets: sets,
                ..Default::default()
            };
            let ex = db.create_exercise(&draft)?;
            println!("Added: {} - {}x {} (id: {})", ex.name, ex.default_sets, ex.default_set, ex.id);
        }

        ExerciseCmd::List { search, muscle } => {
            let muscle = match muscle {
                Some(m) => Some(m.parse::<MuscleGroup>().map_err(anyhow::Error::msg)?),
                None => None,
            };
            let exercises = db.list_exercises(&ExerciseFilter { search, muscle })?;
            println!("{:-<70}", "");
            for e in exercises {
                println!("{:24} | {:>2}x {:12} | {}", e.name, e.default_sets, e.default_set.to_string(), e.muscle_summary());
            }
        }

        ExerciseCmd::Show { exercise } => {
            let e = db.require_exercise(&exercise)?;
            println!("{} (id: {})", e.name, e.id);
            println!("Muscles: {}", e.muscle_summary());
            println!("Default: {} x {}", e.default_sets, e.default_set);
            if let Some(image) = &e.image {
                println!("Image: {} (x {:.0}, y {:.0}, zoom {:.2})", image, e.image_transform.x, e.image_transform.y, e.image_transform.scale);
            }
            if !e.notes.is_empty() {
                println!("Notes: {}", e.notes);
            }
        }

        ExerciseCmd::Edit { exercise, name, muscle, notes, sets, set, image } => {
            let existing = db.require_exercise(&exercise)?;
            let mut draft = ExerciseDraft::from_exercise(&existing);
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(muscle) = muscle {
                draft.muscle_groups = parse_muscles(&muscle);
            }
            if let Some(notes) = notes {
                draft.notes = notes;
            }
            if let Some(sets) = sets {
                draft.default_sets = sets;
            }
            if let Some(new_set) = set.to_set() {
                draft.default_set = new_set;
            }
            if let Some(image) = image {
                draft.image = Some(image);
            }
            let ex = db.update_exercise(&existing.id, &draft)?;
            println!("Updated: {}", ex.name);
        }

        ExerciseCmd::Delete { exercise } => {
            let ex = db.require_exercise(&exercise)?;
            let touched = db.delete_exercise(&ex.id)?;
            println!("Deleted {} (removed from {} workouts)", ex.name, touched);
        }
    }
    Ok(())
}

/// 1-based position from the command line to an index
fn index_of(position: usize) -> Result<usize> {
    if position == 0 {
        bail!("Positions start at 1");
    }
    Ok(position - 1)
}

fn workout_cmd(db: &Database, cmd: WorkoutCmd) -> Result<()> {
    match cmd {
        WorkoutCmd::Create { name, description } => {
            let w = db.create_workout(&name, &description)?;
            println!("Created: {} (id: {})", w.name, w.id);
        }

        WorkoutCmd::List { search } => {
            for w in db.list_workouts(search.as_deref())? {
                println!(
                    "{:24} | {:>2} exercises | {:>3} sets | ~{}",
                    w.name,
                    w.exercises.len(),
                    w.total_sets(),
                    format_duration(w.estimated_duration_secs())
                );
            }
        }

        WorkoutCmd::Show { workout } => {
            let w = db.require_workout(&workout)?;
            println!("{} (id: {})", w.name, w.id);
            if !w.description.is_empty() {
                println!("{}", w.description);
            }
            println!("{:-<60}", "");
            for (i, slot) in w.exercises.iter().enumerate() {
                let name = db
                    .find_exercise(&slot.exercise_id)?
                    .map(|e| e.name)
                    .unwrap_or_else(|| "?".to_string());
                let sets: Vec<String> = slot.sets.iter().map(|s| s.to_string()).collect();
                println!(
                    "{}. {:20} | {} | rest {} / after {}",
                    i + 1,
                    name,
                    sets.join(", "),
                    format_duration(slot.rest_between_sets),
                    format_duration(slot.rest_after)
                );
            }
            println!("Estimated: {}", format_duration(w.estimated_duration_secs()));
        }

        WorkoutCmd::Add { workout, exercise, sets, set, rest, rest_after } => {
            let planned = match (sets, set.to_set()) {
                (None, None) => None,
                (count, one) => {
                    let ex = db.require_exercise(&exercise)?;
                    let one = one.unwrap_or_else(|| ex.default_set.clone());
                    Some(vec![one; count.unwrap_or(ex.default_sets).max(1) as usize])
                }
            };
            let mut w = db.add_exercise_to_workout(&workout, &exercise, planned)?;
            if rest.is_some() || rest_after.is_some() {
                let last = w.exercises.len() - 1;
                w.set_rest(last, rest, rest_after)?;
                w = db.save_workout(w)?;
            }
            println!("{} now has {} exercises", w.name, w.exercises.len());
        }

        WorkoutCmd::Remove { workout, position } => {
            let mut w = db.require_workout(&workout)?;
            w.remove_exercise(index_of(position)?)?;
            db.save_workout(w)?;
            println!("Removed");
        }

        WorkoutCmd::Move { workout, from, to } => {
            let mut w = db.require_workout(&workout)?;
            w.move_exercise(index_of(from)?, index_of(to)?)?;
            db.save_workout(w)?;
            println!("Moved");
        }

        WorkoutCmd::Rest { workout, position, between, after } => {
            let mut w = db.require_workout(&workout)?;
            w.set_rest(index_of(position)?, between, after)?;
            db.save_workout(w)?;
            println!("Rest updated");
        }

        WorkoutCmd::Duplicate { workout } => {
            let w = db.duplicate_workout(&db.require_workout(&workout)?.id)?;
            println!("Created: {} (id: {})", w.name, w.id);
        }

        WorkoutCmd::Delete { workout } => {
            let w = db.require_workout(&workout)?;
            db.delete_workout(&w.id)?;
            println!("Deleted {}", w.name);
        }
    }
    Ok(())
}

fn print_session(session: &ActiveSession) {
    let (done, total) = session.progress();
    println!(
        "{} | {} | {}/{} sets{}",
        session.workout_name,
        format_duration(session.elapsed_secs.min(u32::MAX as u64) as u32),
        done,
        total,
        if session.paused { " | paused" } else { "" }
    );
    match session.phase {
        Phase::Finished => println!("All sets done - run `fitloop session finish`"),
        Phase::Resting { remaining, .. } => {
            println!("Resting: {} left", format_duration(remaining));
            if let (Some(ex), Some(set)) = (session.current_exercise(), session.current_set()) {
                println!("Up next: {} - set {} ({})", ex.name, session.set_index + 1, set);
            }
        }
        Phase::Working => {
            if let (Some(ex), Some(set)) = (session.current_exercise(), session.current_set()) {
                println!("Now: {} - set {}/{} ({})", ex.name, session.set_index + 1, ex.sets.len(), set);
            }
            if let Some(left) = session.timed_set_remaining() {
                println!("Timer: {} left", format_duration(left));
            }
        }
    }
}

fn session_cmd(db: &Database, cmd: SessionCmd) -> Result<()> {
    let now = Utc::now();

    if let SessionCmd::Start { workout, replace } = &cmd {
        let session = db.begin_session(workout, *replace, now)?;
        print_session(&session);
        return Ok(());
    }
    match cmd {
        SessionCmd::Finish => {
            db.resume_session(now)?;
            if let Some(summary) = db.end_session(true, now)? {
                println!(
                    "Saved: {} sets in {}{}",
                    summary.sets.len(),
                    format_duration(summary.duration_secs.min(u32::MAX as u64) as u32),
                    if summary.completed { "" } else { " (partial)" }
                );
            }
            return Ok(());
        }
        SessionCmd::Abandon => {
            db.end_session(false, now)?;
            println!("Session discarded");
            return Ok(());
        }
        _ => {}
    }

    let mut session = db
        .resume_session(now)?
        .ok_or(fitloop::error::SessionError::NoActiveSession)?;

    match cmd {
        SessionCmd::Status => {}
        SessionCmd::Done { value, weight } => {
            session.complete_set(SetResult { value, weight })?;
        }
        SessionCmd::SkipRest => {
            session.skip_rest();
        }
        SessionCmd::Rest { delta } => {
            session.adjust_rest(delta);
        }
        SessionCmd::Skip => {
            session.skip_exercise()?;
        }
        SessionCmd::Back => session.previous_set(),
        SessionCmd::Pause => session.pause(),
        SessionCmd::Resume => session.resume(),
        SessionCmd::Start { .. } | SessionCmd::Finish | SessionCmd::Abandon => {}
    }

    db.save_session(&session)?;
    print_session(&session);
    Ok(())
}
