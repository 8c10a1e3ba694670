use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::job::JobPriority;
use crate::constants::DEFAULT_WORKFLOW_TYPE;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::state_machine::JobStatus;

fn default_workflow_type() -> String {
    DEFAULT_WORKFLOW_TYPE.to_string()
}

fn default_content_type() -> String {
    "article".to_string()
}

/// Job submission payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub topic: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default = "default_workflow_type")]
    pub workflow_type: String,
    #[serde(default)]
    pub priority: JobPriority,
    /// Queue through the broker instead of executing inline
    #[serde(default, rename = "async")]
    pub run_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Free-form inputs passed through to step services
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ContentRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            content_type: default_content_type(),
            audience: None,
            workflow_type: default_workflow_type(),
            priority: JobPriority::default(),
            run_async: false,
            callback_url: None,
            user_id: None,
            project_id: None,
            metadata: Map::new(),
        }
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = workflow_type.into();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.run_async = true;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Request-level checks that run before any job is created
    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.topic.trim().is_empty() {
            return Err(OrchestrationError::validation("topic cannot be empty"));
        }
        if self.workflow_type.trim().is_empty() {
            return Err(OrchestrationError::validation("workflow type cannot be empty"));
        }
        if let Some(url) = &self.callback_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(OrchestrationError::validation(format!(
                    "callback url must be http(s): {url}"
                )));
            }
        }
        Ok(())
    }
}

/// Answer to a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub estimated_completion_time: DateTime<Utc>,
    /// Compiled output when the job finished before the response was built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
