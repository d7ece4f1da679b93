pub mod execution;
pub mod project;
pub mod scenario;
pub mod testplan;
pub mod user;

use thiserror::Error;

use crate::identity::Identity;
use crate::store::CollectionSpec;

/// Client-supplied data failed a field rule.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A document-backed resource with an [`Identity`].
pub trait Resource {
    /// Value written to `identity.type`.
    const KIND: &'static str;
    const COLLECTION: CollectionSpec;

    /// `None` until the resource has been stamped on creation.
    fn identity(&self) -> Option<&Identity>;
    fn set_identity(&mut self, identity: Identity);
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Every document collection, for index setup.
pub const COLLECTIONS: [CollectionSpec; 4] = [
    <project::Project as Resource>::COLLECTION,
    <scenario::Scenario as Resource>::COLLECTION,
    <testplan::TestPlan as Resource>::COLLECTION,
    <execution::Execution as Resource>::COLLECTION,
];

pub(crate) fn require(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(format!("{} is a mandatory parameter", field)));
    }
    Ok(())
}
