//! Named, pre-vetted workflow templates.
//!
//! A template that was approved once produces workflows whose steps skip
//! the per-step governance check. This is the hot path for high-volume
//! workflows that would otherwise serialize behind human approval.

use crate::definition::WorkflowDefinition;
use chrono::{DateTime, Utc};
use meshflow_core::{MeshflowError, MeshflowResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Parameters handed to a template builder.
pub type TemplateParameters = HashMap<String, serde_json::Value>;

/// Builder turning parameters into a concrete workflow.
pub type BuildFn =
    Arc<dyn Fn(&TemplateParameters) -> MeshflowResult<WorkflowDefinition> + Send + Sync>;

#[derive(Clone)]
pub struct WorkflowTemplate {
    pub template_id: String,
    pub name: String,
    pub is_pre_approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub build: BuildFn,
}

impl WorkflowTemplate {
    pub fn new<F>(template_id: impl Into<String>, name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&TemplateParameters) -> MeshflowResult<WorkflowDefinition> + Send + Sync + 'static,
    {
        Self {
            template_id: template_id.into(),
            name: name.into(),
            is_pre_approved: false,
            approved_by: None,
            approved_at: None,
            build: Arc::new(build),
        }
    }

    /// Mark the template as vetted by `approver` now.
    pub fn approved_by(mut self, approver: impl Into<String>) -> Self {
        self.is_pre_approved = true;
        self.approved_by = Some(approver.into());
        self.approved_at = Some(Utc::now());
        self
    }

    pub fn info(&self) -> TemplateInfo {
        TemplateInfo {
            template_id: self.template_id.clone(),
            name: self.name.clone(),
            is_pre_approved: self.is_pre_approved,
            approved_by: self.approved_by.clone(),
            approved_at: self.approved_at,
        }
    }
}

impl std::fmt::Debug for WorkflowTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTemplate")
            .field("template_id", &self.template_id)
            .field("name", &self.name)
            .field("is_pre_approved", &self.is_pre_approved)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a registered template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub template_id: String,
    pub name: String,
    pub is_pre_approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Registry of templates keyed by id. Last registration wins.
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, WorkflowTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_template(&self, template: WorkflowTemplate) {
        info!(
            template_id = %template.template_id,
            pre_approved = template.is_pre_approved,
            "Registered workflow template"
        );
        self.templates
            .write()
            .insert(template.template_id.clone(), template);
    }

    /// Unknown templates are never pre-approved.
    pub fn is_pre_approved(&self, template_id: &str) -> bool {
        self.templates
            .read()
            .get(template_id)
            .is_some_and(|t| t.is_pre_approved)
    }

    pub fn get(&self, template_id: &str) -> Option<TemplateInfo> {
        self.templates.read().get(template_id).map(WorkflowTemplate::info)
    }

    pub fn list(&self) -> Vec<TemplateInfo> {
        let mut infos: Vec<TemplateInfo> = self
            .templates
            .read()
            .values()
            .map(WorkflowTemplate::info)
            .collect();
        infos.sort_by(|a, b| a.template_id.cmp(&b.template_id));
        infos
    }

    /// Build a workflow from a registered template.
    ///
    /// The template's approval flag is copied onto the definition; a
    /// pre-approved template also clears `requires_governance_check` on
    /// every step.
    pub fn create_workflow_from_token(
        &self,
        template_id: &str,
        parameters: &TemplateParameters,
    ) -> MeshflowResult<WorkflowDefinition> {
        // Clone out of the lock so the builder runs unlocked.
        let (build, pre_approved) = {
            let templates = self.templates.read();
            let template = templates.get(template_id).ok_or_else(|| {
                MeshflowError::Validation(format!("Unknown workflow template '{template_id}'"))
            })?;
            (Arc::clone(&template.build), template.is_pre_approved)
        };

        let mut definition = build(parameters)?;
        definition.is_pre_approved = pre_approved;
        if pre_approved {
            for step in &mut definition.steps {
                step.requires_governance_check = false;
            }
        }
        Ok(definition)
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
