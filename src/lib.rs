//! fitloop - local workout tracker
//!
//! Exercises and workouts live in a local SQLite file used as key-value
//! object stores; sessions run set by set with rest timers and are saved
//! after every step so they survive a restart.

pub mod db;
pub mod error;
pub mod exercises;
pub mod session;
pub mod settings;
pub mod transfer;
pub mod tui;
pub mod workouts;

pub use db::Database;
