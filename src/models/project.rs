use serde::{Deserialize, Serialize};

use super::{require, Resource, ValidationError};
use crate::identity::Identity;
use crate::store::CollectionSpec;

/// Umbrella for tests that target the same product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Resource for Project {
    const KIND: &'static str = "project";
    const COLLECTION: CollectionSpec = CollectionSpec {
        name: "projects",
        unique: &["name"],
    };

    fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name")
    }
}
