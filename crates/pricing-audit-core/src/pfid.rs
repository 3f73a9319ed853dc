//! Hierarchical station identifiers (`ACN-ACC-ACG-ACS`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

const MAX_SEGMENTS: usize = 4;

/// How much of the hierarchy a scan covers, derived from segment count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Network,
    Cluster,
    Group,
    Station,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Network => "network",
            ScanMode::Cluster => "cluster",
            ScanMode::Group => "group",
            ScanMode::Station => "station",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PFID prefix of one to four non-empty segments.
///
/// Persisted and displayed in its dash-joined form, so `0051 09 02` and
/// `0051-09-02` are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pfid {
    segments: Vec<String>,
}

impl Pfid {
    /// Normalizes command-line input: each argument may hold one segment,
    /// several space-separated segments, or a dash-joined prefix.
    pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut segments = Vec::new();
        for arg in args {
            let arg = arg.as_ref();
            if arg.trim().is_empty() {
                return Err(AuditError::InvalidIdentifier(
                    "identifier segments cannot be empty".to_string(),
                ));
            }
            for word in arg.split_whitespace() {
                for segment in word.split('-') {
                    if segment.is_empty() {
                        return Err(AuditError::InvalidIdentifier(format!(
                            "'{}' contains an empty segment",
                            arg.trim()
                        )));
                    }
                    segments.push(segment.to_string());
                }
            }
        }
        Self::from_segments(segments)
    }

    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_args(&[input])
    }

    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() {
            return Err(AuditError::InvalidIdentifier(
                "at least the network (ACN) segment is required".to_string(),
            ));
        }
        if segments.len() > MAX_SEGMENTS {
            return Err(AuditError::InvalidIdentifier(format!(
                "expected at most {MAX_SEGMENTS} segments (ACN-ACC-ACG-ACS), got {}",
                segments.len()
            )));
        }
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || s.contains('-') || s.chars().any(char::is_whitespace))
        {
            return Err(AuditError::InvalidIdentifier(format!(
                "segment '{bad}' is not a plain token"
            )));
        }
        Ok(Self { segments })
    }

    pub fn mode(&self) -> ScanMode {
        match self.segments.len() {
            1 => ScanMode::Network,
            2 => ScanMode::Cluster,
            3 => ScanMode::Group,
            _ => ScanMode::Station,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn network(&self) -> &str {
        &self.segments[0]
    }

    pub fn cluster(&self) -> Option<&str> {
        self.segments.get(1).map(String::as_str)
    }

    pub fn group(&self) -> Option<&str> {
        self.segments.get(2).map(String::as_str)
    }

    pub fn station(&self) -> Option<&str> {
        self.segments.get(3).map(String::as_str)
    }

    /// The ledger key for a scan of this scope.
    pub fn site_key(&self) -> String {
        self.to_string()
    }

    /// True when `other` lies inside this scope.
    pub fn contains(&self, other: &Pfid) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// Extends this prefix with a child segment.
    pub fn child(&self, segment: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }

    /// Human-readable labelled form, e.g. `ACN: 0051, ACC: 09`.
    pub fn labelled(&self) -> String {
        const LABELS: [&str; MAX_SEGMENTS] = ["ACN", "ACC", "ACG", "ACS"];
        LABELS
            .iter()
            .zip(&self.segments)
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Pfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("-"))
    }
}

impl TryFrom<String> for Pfid {
    type Error = AuditError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Pfid> for String {
    fn from(value: Pfid) -> Self {
        value.to_string()
    }
}
