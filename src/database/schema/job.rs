use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::common::RECOGNIZED_RESPONSE_FIELDS;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Done,
    Error,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(JobStatus::InProgress),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            _ => Err(format!("Invalid JobStatus: {}", s)),
        }
    }
}

/// One unit of work moving through a workflow's ordered steps. Mutated only
/// by the engine, inside a single write transaction per change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub workflow_name: String,
    pub step_index: usize,
    pub status: JobStatus,
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(workflow_name: impl Into<String>, initial_payload: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            step_index: 0,
            status: JobStatus::InProgress,
            payload: initial_payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge recognized fields from a worker response into the payload.
    /// Object values merge key-wise one level deep (so `translations`
    /// accumulates per-language entries instead of being replaced); anything
    /// else overwrites its key. Unrecognized fields are ignored, not stored.
    /// Returns the number of fields merged.
    pub fn merge_response(&mut self, fields: &Map<String, Value>) -> usize {
        let mut merged = 0;
        for (key, value) in fields {
            if !RECOGNIZED_RESPONSE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            match (self.payload.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    self.payload.insert(key.clone(), value.clone());
                }
            }
            merged += 1;
        }
        merged
    }
}
