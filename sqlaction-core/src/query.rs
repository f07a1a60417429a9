//! Query-level execution settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Case policy applied to result column names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capitalization {
    #[default]
    None,
    Upper,
    Lower,
}

impl Capitalization {
    pub fn apply(&self, name: &str) -> String {
        match self {
            Capitalization::None => name.to_string(),
            Capitalization::Upper => name.to_uppercase(),
            Capitalization::Lower => name.to_lowercase(),
        }
    }
}

impl FromStr for Capitalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "default" => Ok(Capitalization::None),
            "upper" => Ok(Capitalization::Upper),
            "lower" => Ok(Capitalization::Lower),
            other => Err(format!("unknown capitalization '{}'", other)),
        }
    }
}

impl fmt::Display for Capitalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capitalization::None => "none",
            Capitalization::Upper => "upper",
            Capitalization::Lower => "lower",
        };
        f.write_str(s)
    }
}

/// Declared metadata of a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Query name passed to observers, if any
    #[serde(default)]
    pub name: Option<String>,
    /// Driver fetch size, `0` keeps the driver default
    #[serde(default)]
    pub fetch_size: usize,
    /// Statement timeout in seconds, `0` means none
    #[serde(default)]
    pub statement_timeout: u32,
    /// Rows to skip
    #[serde(default)]
    pub fetch_offset: usize,
    /// Maximum rows to return, `0` means unbounded
    #[serde(default)]
    pub fetch_limit: usize,
    #[serde(default)]
    pub capitalization: Capitalization,
}

impl QueryMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_fetch_size(mut self, rows: usize) -> Self {
        self.fetch_size = rows;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.statement_timeout = seconds;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.fetch_offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn with_capitalization(mut self, capitalization: Capitalization) -> Self {
        self.capitalization = capitalization;
        self
    }
}
