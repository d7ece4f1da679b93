use serde::{Deserialize, Serialize};

use super::{require, Resource, ValidationError};
use crate::identity::Identity;
use crate::store::CollectionSpec;

/// Named grouping of executions inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Resource for TestPlan {
    const KIND: &'static str = "testplan";
    const COLLECTION: CollectionSpec = CollectionSpec {
        name: "testplans",
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
        require(&self.project_id, "projectId")
    }
}
