//! # Workflow Templates
//!
//! Declarative workflow definitions: an ordered list of steps, each bound to
//! an external step service and tagged with a layer and its dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Logical processing phase of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Bottom,
    Middle,
    Top,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Self::Bottom, Self::Middle, Self::Top];

    /// Tie-break rank used when several steps become ready together
    pub fn rank(&self) -> u8 {
        match self {
            Self::Bottom => 0,
            Self::Middle => 1,
            Self::Top => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bottom => "bottom",
            Self::Middle => "middle",
            Self::Top => "top",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bottom" => Ok(Self::Bottom),
            "middle" => Ok(Self::Middle),
            "top" => Ok(Self::Top),
            _ => Err(format!("Invalid layer: {s} (expected bottom, middle or top)")),
        }
    }
}

/// Gate evaluated right before a step is invoked
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepCondition {
    /// Run even when an optional dependency produced no result
    #[default]
    Always,
    /// Skip when any dependency result is null
    DependenciesSucceeded,
    /// Run only when the request metadata field equals the given value
    RequestField { field: String, equals: Value },
}

fn default_required() -> bool {
    true
}

/// One unit of work inside a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub layer: Layer,
    /// Opaque binding resolved through the step service registry
    pub service_ref: String,
    /// Failure of a required step fails the job; omitted means required
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Per-step timeout; the executor default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub condition: StepCondition,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, layer: Layer, service_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer,
            service_ref: service_ref.into(),
            required: true,
            depends_on: BTreeSet::new(),
            timeout_ms: None,
            retryable: false,
            condition: StepCondition::Always,
        }
    }

    pub fn depends_on<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn default_active() -> bool {
    true
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Declarative template of dependency-linked steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub estimated_duration_secs: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        workflow_type: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            workflow_type: workflow_type.into(),
            steps,
            estimated_duration_secs: 0,
            tags: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration_secs = duration.as_secs();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs(self.estimated_duration_secs)
    }
}

/// Partial update applied by `WorkflowRegistry::update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub version: Option<String>,
    pub workflow_type: Option<String>,
    pub steps: Option<Vec<WorkflowStep>>,
    pub estimated_duration_secs: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl WorkflowPatch {
    /// Produce the patched copy; the original stays untouched until validated
    pub fn apply_to(&self, workflow: &Workflow) -> Workflow {
        let mut patched = workflow.clone();
        if let Some(name) = &self.name {
            patched.name = name.clone();
        }
        if let Some(version) = &self.version {
            patched.version = version.clone();
        }
        if let Some(workflow_type) = &self.workflow_type {
            patched.workflow_type = workflow_type.clone();
        }
        if let Some(steps) = &self.steps {
            patched.steps = steps.clone();
        }
        if let Some(secs) = self.estimated_duration_secs {
            patched.estimated_duration_secs = secs;
        }
        if let Some(tags) = &self.tags {
            patched.tags = tags.clone();
        }
        if let Some(is_active) = self.is_active {
            patched.is_active = is_active;
        }
        patched.updated_at = Utc::now();
        patched
    }
}

/// Listing filter for registered workflows
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub active_only: bool,
    pub workflow_type: Option<String>,
    pub tag: Option<String>,
}

impl WorkflowFilter {
    pub fn matches(&self, workflow: &Workflow) -> bool {
        (!self.active_only || workflow.is_active)
            && self
                .workflow_type
                .as_deref()
                .is_none_or(|t| workflow.workflow_type == t)
            && self
                .tag
                .as_deref()
                .is_none_or(|tag| workflow.tags.iter().any(|t| t == tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults_when_omitted() {
        let step: WorkflowStep = serde_json::from_value(serde_json::json!({
            "name": "intent_analysis",
            "layer": "bottom",
            "service_ref": "intent-analyzer"
        }))
        .unwrap();

        assert!(step.required);
        assert!(!step.retryable);
        assert!(step.depends_on.is_empty());
        assert_eq!(step.condition, StepCondition::Always);
        assert_eq!(step.timeout(), None);
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let result: Result<WorkflowStep, _> = serde_json::from_value(serde_json::json!({
            "name": "x",
            "layer": "basement",
            "service_ref": "svc"
        }));
        assert!(result.is_err());
        assert!("basement".parse::<Layer>().is_err());
    }

    #[test]
    fn test_layer_ordering() {
        assert!(Layer::Bottom < Layer::Middle);
        assert!(Layer::Middle < Layer::Top);
        assert_eq!(Layer::Top.rank(), 2);
    }

    #[test]
    fn test_patch_leaves_original_untouched() {
        let workflow = Workflow::new(
            "wf",
            "Workflow",
            "standard",
            vec![WorkflowStep::new("a", Layer::Bottom, "svc-a")],
        );
        let patch = WorkflowPatch {
            name: Some("Renamed".to_string()),
            is_active: Some(false),
            ..Default::default()
        };

        let patched = patch.apply_to(&workflow);
        assert_eq!(patched.name, "Renamed");
        assert!(!patched.is_active);
        assert_eq!(workflow.name, "Workflow");
        assert_eq!(patched.steps, workflow.steps);
    }

    #[test]
    fn test_filter_matches() {
        let workflow = Workflow::new("wf", "Workflow", "standard", vec![]).with_tags(["seo"]);
        assert!(WorkflowFilter::default().matches(&workflow));
        assert!(WorkflowFilter {
            tag: Some("seo".to_string()),
            ..Default::default()
        }
        .matches(&workflow));
        assert!(!WorkflowFilter {
            workflow_type: Some("research".to_string()),
            ..Default::default()
        }
        .matches(&workflow));
        assert!(!WorkflowFilter {
            active_only: true,
            ..Default::default()
        }
        .matches(&workflow.clone().inactive()));
    }
}
