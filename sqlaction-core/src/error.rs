//! Error types for sqlaction-core.
//!
//! Two layers: [`DriverError`] is what a driver implementation raises, [`AccessError`] is
//! what the actions and iterators surface to callers. Driver errors pass through unchanged
//! inside [`AccessError::Driver`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::entity::ObjectId;
use crate::types::Value;

/// Error raised by a driver implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("SQL error: {0}")]
    Sql(String),

    #[error("Statement timed out after {0}s")]
    Timeout(u32),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Operation not supported by driver: {0}")]
    Unsupported(String),

    #[error("Invalid parameter index: {0}")]
    InvalidParameter(usize),

    #[error("Invalid column index: {0}")]
    InvalidColumn(usize),

    #[error("No current row")]
    NoCurrentRow,
}

/// Result type for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Details of a batch row whose single-row update did not happen.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticLockFailure {
    pub object_id: ObjectId,
    pub entity: String,
    pub sql: String,
    pub qualifier: BTreeMap<String, Value>,
    pub update_count: i64,
}

impl fmt::Display for OptimisticLockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Optimistic lock failure for {} on '{}': {} row(s) updated, expected 1. SQL: {}",
            self.object_id, self.entity, self.update_count, self.sql
        )?;
        if !self.qualifier.is_empty() {
            let parts: Vec<String> = self
                .qualifier
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " [{}]", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Error type for action execution and result iteration
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    OptimisticLock(Box<OptimisticLockFailure>),

    #[error("Error closing result iterator: {}", .messages.join("; "))]
    ResourceClose { messages: Vec<String> },

    #[error("Result iterator is closed")]
    IteratorClosed,

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result type for access operations
pub type AccessResult<T> = Result<T, AccessError>;

impl AccessError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AccessError::Configuration(msg.into())
    }

    /// Folds a list of close failures into a single error, `None` if the list is empty.
    pub fn from_close_failures(failures: Vec<AccessError>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }

        let mut messages = Vec::with_capacity(failures.len());
        for failure in failures {
            match failure {
                AccessError::ResourceClose { messages: nested } => messages.extend(nested),
                other => messages.push(other.to_string()),
            }
        }
        Some(AccessError::ResourceClose { messages })
    }

    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, AccessError::OptimisticLock(_))
    }
}

impl serde::Serialize for AccessError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl serde::Serialize for DriverError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
