//! sqlaction - SQL actions over SQLite
//!
//! Wires the driver independent engine in [`sqlaction_core`] to SQLite through
//! `rusqlite`, with a TOML configuration file and a JSON lines result printer used by
//! the `sqlaction` command line tool.

pub mod config;
pub mod output;
pub mod sqlite;

pub use config::Config;
pub use output::JsonLinesObserver;
pub use sqlite::{sqlite_features, SqliteConnection, SqliteStatement};

pub use sqlaction_core;
