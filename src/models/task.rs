use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ToolName;

/// One tool invocation attempt, in invocation order. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolTrace {
    pub tool: ToolName,
    pub input: String,
    pub output: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolTrace {
    pub fn success(tool: ToolName, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool,
            input: input.into(),
            output: output.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(tool: ToolName, input: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool,
            input: input.into(),
            output: String::new(),
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// The structured outcome of one task execution. Not persisted; emitted as
/// the response only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub agent_id: String,
    pub task: String,
    pub result: String,
    pub tool_traces: Vec<ToolTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub user_requirement: String,
    #[serde(default)]
    pub is_composite: bool,
}

#[derive(Debug, Deserialize)]
pub struct RunTaskRequest {
    pub task: String,
}
