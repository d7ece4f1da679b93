use serde::{Deserialize, Serialize};

use super::scenario;
use super::{require, Resource, ValidationError};
use crate::identity::Identity;
use crate::store::CollectionSpec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    #[default]
    Pending,
}

/// Scenario step plus its recorded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecutionStep {
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
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub actual_result: String,
}

impl From<&scenario::Step> for ExecutionStep {
    fn from(step: &scenario::Step) -> Self {
        Self {
            position: step.position,
            name: step.name.clone(),
            description: step.description.clone(),
            action: step.action.clone(),
            expected_outcome: step.expected_outcome.clone(),
            status: Status::Pending,
            actual_result: String::new(),
        }
    }
}

/// One run of a scenario as part of a test plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Execution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub scenario_id: String,
    #[serde(default, rename = "testplanId")]
    pub testplan_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub actual_result: String,
}

impl Execution {
    /// Reset the run to the scenario's steps, all pending.
    pub fn populate_steps(&mut self, steps: &[scenario::Step]) {
        self.steps = steps.iter().map(ExecutionStep::from).collect();
        self.status = Status::Pending;
    }

    /// Merge reported step results, matched by name and position. The
    /// overall status comes from `report` unless a step failed.
    pub fn apply_results(&mut self, report: &Execution) {
        self.status = report.status;
        if !report.actual_result.is_empty() {
            self.actual_result = report.actual_result.clone();
        }
        for reported in &report.steps {
            for step in self
                .steps
                .iter_mut()
                .filter(|s| s.name == reported.name && s.position == reported.position)
            {
                step.status = reported.status;
                step.actual_result = reported.actual_result.clone();
                if reported.status == Status::Fail {
                    self.status = Status::Fail;
                }
            }
        }
    }
}

impl Resource for Execution {
    const KIND: &'static str = "execution";
    const COLLECTION: CollectionSpec = CollectionSpec {
        name: "executions",
        unique: &[],
    };

    fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.testplan_id, "testplanId")?;
        require(&self.scenario_id, "scenarioId")?;
        require(&self.project_id, "projectId")
    }
}
