//! Job records and their ComfyUI `/history` rendering.
use serde_json::{json, Value};
use std::time::SystemTime;

/// Output node id the host frontend reads images from.
pub const OUTPUT_NODE_ID: &str = "9";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Completed { filename: String },
    Failed { message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub number: u64,
    pub prompt: String,
    pub state: JobState,
    pub submitted_at: SystemTime,
}

impl JobRecord {
    pub fn pending(id: impl Into<String>, number: u64, prompt: impl Into<String>) -> Self {
        JobRecord {
            id: id.into(),
            number,
            prompt: prompt.into(),
            state: JobState::Pending,
            submitted_at: SystemTime::now(),
        }
    }

    /// The value stored under this job's id in a `/history` response.
    ///
    /// Pending jobs render as `{}` so clients keep polling.
    pub fn history_entry(&self) -> Value {
        match &self.state {
            JobState::Pending => json!({}),
            JobState::Completed { filename } => json!({
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {
                    OUTPUT_NODE_ID: {
                        "images": [{"filename": filename, "subfolder": "", "type": "output"}]
                    }
                }
            }),
            JobState::Failed { message } => json!({
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [["execution_error", {
                        "prompt_id": self.id,
                        "exception_message": message
                    }]]
                },
                "outputs": {}
            }),
        }
    }
}
