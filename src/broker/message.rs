use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::database::schema::job::JobId;

/// Field every dispatch and response message must carry. It is the only
/// field the engine itself relies on; everything else is stage-specific and
/// passes through opaquely.
pub const JOB_ID_FIELD: &str = "job_id";

/// Flat key-value wire document, JSON on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerMessage(pub Map<String, Value>);

impl BrokerMessage {
    /// The thin dispatch form: only the job identifier. Workers re-read
    /// current state by id, which avoids stale-payload drift.
    pub fn job_ref(job_id: JobId) -> Self {
        let mut fields = Map::new();
        fields.insert(JOB_ID_FIELD.into(), Value::String(job_id.to_string()));
        Self(fields)
    }

    /// The fat dispatch form: identifier plus the accumulated payload.
    pub fn with_payload(job_id: JobId, payload: &Map<String, Value>) -> Self {
        let mut message = Self::job_ref(job_id);
        for (key, value) in payload {
            if key != JOB_ID_FIELD {
                message.0.insert(key.clone(), value.clone());
            }
        }
        message
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.0
            .get(JOB_ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
