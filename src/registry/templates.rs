//! # Workflow Templates
//!
//! Built-in content workflows plus YAML template loading. A template file
//! holds one workflow in the same shape `Workflow` serializes to:
//!
//! ```yaml
//! id: localized-v1
//! name: Localized Article
//! type: localized
//! steps:
//!   - name: intent_analysis
//!     layer: bottom
//!     service_ref: intent-analyzer
//!   - name: translation
//!     layer: middle
//!     service_ref: translator
//!     depends_on: [intent_analysis]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::TEMPLATE_EXTENSIONS;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::models::{Layer, StepCondition, Workflow, WorkflowStep};

/// The workflows every deployment starts with
pub fn builtin_workflows() -> Vec<Workflow> {
    vec![standard_workflow(), research_workflow(), refresh_workflow()]
}

/// Full article pipeline: analysis, structure, then generation and markup
pub fn standard_workflow() -> Workflow {
    Workflow::new(
        "standard-v1",
        "Standard Article",
        "standard",
        vec![
            WorkflowStep::new("intent_analysis", Layer::Bottom, "intent-analyzer"),
            WorkflowStep::new("keyword_research", Layer::Bottom, "keyword-researcher")
                .depends_on(["intent_analysis"])
                .retryable(),
            WorkflowStep::new("content_outline", Layer::Middle, "outline-builder")
                .depends_on(["intent_analysis", "keyword_research"]),
            WorkflowStep::new("citation_verification", Layer::Middle, "citation-verifier")
                .depends_on(["content_outline"])
                .optional()
                .retryable(),
            WorkflowStep::new("content_generation", Layer::Top, "content-generator")
                .depends_on(["content_outline"])
                .with_timeout(Duration::from_secs(120)),
            WorkflowStep::new("schema_generation", Layer::Top, "schema-generator")
                .depends_on(["content_generation"])
                .optional(),
        ],
    )
    .with_estimated_duration(Duration::from_secs(180))
    .with_tags(["article", "seo"])
}

/// Source-heavy pipeline where verified citations are mandatory
pub fn research_workflow() -> Workflow {
    Workflow::new(
        "research-v1",
        "Research Brief",
        "research",
        vec![
            WorkflowStep::new("intent_analysis", Layer::Bottom, "intent-analyzer"),
            WorkflowStep::new("source_discovery", Layer::Bottom, "source-discovery")
                .depends_on(["intent_analysis"])
                .retryable(),
            WorkflowStep::new("citation_verification", Layer::Middle, "citation-verifier")
                .depends_on(["source_discovery"])
                .retryable(),
            WorkflowStep::new("fact_synthesis", Layer::Middle, "fact-synthesizer")
                .depends_on(["citation_verification"]),
            WorkflowStep::new("research_brief", Layer::Top, "brief-writer")
                .depends_on(["fact_synthesis"])
                .with_timeout(Duration::from_secs(120)),
        ],
    )
    .with_estimated_duration(Duration::from_secs(240))
    .with_tags(["research", "citations"])
}

/// Update pass over existing content
pub fn refresh_workflow() -> Workflow {
    Workflow::new(
        "refresh-v1",
        "Content Refresh",
        "refresh",
        vec![
            WorkflowStep::new("content_audit", Layer::Bottom, "content-auditor"),
            WorkflowStep::new("freshness_scoring", Layer::Middle, "freshness-scorer")
                .depends_on(["content_audit"]),
            WorkflowStep::new("citation_verification", Layer::Middle, "citation-verifier")
                .depends_on(["content_audit"])
                .optional()
                .retryable(),
            WorkflowStep::new("content_update", Layer::Top, "content-updater")
                .depends_on(["freshness_scoring", "citation_verification"]),
            WorkflowStep::new("schema_generation", Layer::Top, "schema-generator")
                .depends_on(["content_update"])
                .optional()
                .with_condition(StepCondition::DependenciesSucceeded),
        ],
    )
    .with_estimated_duration(Duration::from_secs(90))
    .with_tags(["refresh", "seo"])
}

/// Parse one YAML workflow template
pub fn parse_template(source: &str) -> OrchestrationResult<Workflow> {
    Ok(serde_yaml::from_str(source)?)
}

/// Read every `*.yaml` / `*.yml` template in `dir`, in file-name order
pub fn load_templates_from_dir(dir: &Path) -> OrchestrationResult<Vec<Workflow>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        OrchestrationError::Configuration(format!(
            "cannot read template directory '{}': {e}",
            dir.display()
        ))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
        })
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| {
            debug!(template = %path.display(), "Parsing workflow template");
            let source = fs::read_to_string(path).map_err(|e| {
                OrchestrationError::Configuration(format!(
                    "cannot read template '{}': {e}",
                    path.display()
                ))
            })?;
            parse_template(&source).map_err(|e| match e {
                OrchestrationError::Validation(reason) => OrchestrationError::Validation(format!(
                    "{}: {reason}",
                    path.display()
                )),
                other => other,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::validation::validate_workflow;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_workflows_are_valid() {
        let workflows = builtin_workflows();
        assert_eq!(workflows.len(), 3);
        for workflow in &workflows {
            validate_workflow(workflow).unwrap();
        }
        let types: Vec<&str> = workflows.iter().map(|w| w.workflow_type.as_str()).collect();
        assert_eq!(types, ["standard", "research", "refresh"]);
    }

    #[test]
    fn test_parse_template_applies_defaults() {
        let workflow = parse_template(
            r#"
id: localized-v1
name: Localized Article
type: localized
steps:
  - name: intent_analysis
    layer: bottom
    service_ref: intent-analyzer
  - name: translation
    layer: middle
    service_ref: translator
    depends_on: [intent_analysis]
    required: false
"#,
        )
        .unwrap();

        assert_eq!(workflow.workflow_type, "localized");
        assert_eq!(workflow.version, "1.0.0");
        assert!(workflow.is_active);
        assert!(workflow.steps[0].required);
        assert!(!workflow.steps[1].required);
    }

    #[test]
    fn test_unknown_layer_is_a_validation_error() {
        let result = parse_template(
            "id: x\nname: X\ntype: x\nsteps:\n  - name: a\n    layer: basement\n    service_ref: svc\n",
        );
        assert!(matches!(result, Err(OrchestrationError::Validation(_))));
    }

    #[test]
    fn test_directory_loading_skips_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("b.yml"),
            "id: b\nname: B\ntype: b\nsteps:\n  - name: s\n    layer: top\n    service_ref: svc\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.yaml"),
            "id: a\nname: A\ntype: a\nsteps:\n  - name: s\n    layer: bottom\n    service_ref: svc\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a template").unwrap();

        let workflows = load_templates_from_dir(dir.path()).unwrap();
        let ids: Vec<&str> = workflows.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_missing_directory_is_a_configuration_error() {
        let result = load_templates_from_dir(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(OrchestrationError::Configuration(_))));
    }
}
