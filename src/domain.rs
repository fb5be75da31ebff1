use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProteomeError;

/// Opaque UniProt proteome key such as `UP000005640`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProteomeId(String);

impl ProteomeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProteomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProteomeId {
    type Err = ProteomeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && !trimmed.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(ProteomeError::InvalidProteomeId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for ProteomeId {
    type Error = ProteomeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProteomeId> for String {
    fn from(value: ProteomeId) -> Self {
        value.0
    }
}

/// One record to pull from the remote source. The label only annotates the
/// FASTA header and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub identifier: ProteomeId,
    pub label: String,
}

impl FetchRequest {
    pub fn new(identifier: ProteomeId, label: impl Into<String>) -> Self {
        Self {
            identifier,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureKind {
    RemoteStatus(u16),
    Transport,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub identifier: ProteomeId,
    pub label: String,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        identifier: ProteomeId,
        label: String,
        payload: Vec<u8>,
    },
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn failure(request: &FetchRequest, kind: FailureKind, reason: impl Into<String>) -> Self {
        FetchOutcome::Failure(FetchFailure {
            identifier: request.identifier.clone(),
            label: request.label.clone(),
            kind,
            reason: reason.into(),
        })
    }

    pub fn identifier(&self) -> &ProteomeId {
        match self {
            FetchOutcome::Success { identifier, .. } => identifier,
            FetchOutcome::Failure(failure) => &failure.identifier,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}
