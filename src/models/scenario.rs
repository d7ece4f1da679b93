use serde::{Deserialize, Serialize};

use super::{require, Resource, ValidationError};
use crate::identity::Identity;
use crate::store::CollectionSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueType {
    Epic,
    Story,
    Defect,
}

/// Tracker issue linked to a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkedIssue {
    #[serde(default)]
    pub link: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: IssueType,
    #[serde(default)]
    pub state: String,
}

/// One action of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Step {
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub expected_outcome: String,
}

/// A test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prerequisites: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub issues: Vec<LinkedIssue>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Resource for Scenario {
    const KIND: &'static str = "scenario";
    const COLLECTION: CollectionSpec = CollectionSpec {
        name: "scenarios",
        unique: &["projectId", "name"],
    };

    fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")?;
        require(&self.project_id, "projectId")?;
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(ValidationError::new("name is a mandatory parameter for a step"));
            }
        }
        Ok(())
    }
}
