use std::future::Future;
use std::sync::Arc;

use anyhow::Context;

use crate::auth::keys::{FileKeyRetriever, KeyRetriever};
use crate::auth::session::SessionStore;
use crate::auth::{password, Authorizer, SessionAuthorizer, SignedTokenAuthorizer};
use crate::config::{AuthScheme, Config, StorageBackend};
use crate::identity::IdentityAllocator;
use crate::models::execution::Execution;
use crate::models::project::Project;
use crate::models::scenario::Scenario;
use crate::models::testplan::TestPlan;
use crate::models::user::NewUser;
use crate::models::COLLECTIONS;
use crate::store::memory::{MemorySessionStore, MemoryStore, MemoryUserStore};
use crate::store::postgres::PgStore;
use crate::store::{Collection, DocumentStore, StoreError, UserStore};

pub struct AppState {
    pub config: Config,
    pub authorizer: Arc<Authorizer>,
    pub identities: Arc<IdentityAllocator>,
    pub users: Arc<dyn UserStore>,
    pub projects: Collection<Project>,
    pub scenarios: Collection<Scenario>,
    pub testplans: Collection<TestPlan>,
    pub executions: Collection<Execution>,
    /// Set when running against PostgreSQL; readiness pings it.
    pub db: Option<PgStore>,
}

impl AppState {
    /// Wire up storage and the configured token scheme.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        match config.storage {
            StorageBackend::Postgres => {
                tracing::info!("Connecting to database...");
                let db = PgStore::connect(&config.database_url, config.db_max_connections)
                    .await
                    .context("connecting to PostgreSQL")?;
                tracing::info!("Running migrations...");
                db.migrate().await.context("running migrations")?;
                db.ensure_indexes(&COLLECTIONS).await.context("creating unique indexes")?;

                let shared = Arc::new(db.clone());
                let authorizer = authorizer_for(&config, shared.clone())?;
                Ok(Self::assemble(config, authorizer, shared.clone(), shared, Some(db)))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let authorizer = authorizer_for(&config, Arc::new(MemorySessionStore::new()))?;
                Ok(Self::memory(config, authorizer))
            }
        }
    }

    /// In-memory documents and users with the given token scheme.
    pub fn memory(config: Config, authorizer: Authorizer) -> Self {
        Self::assemble(
            config,
            authorizer,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryUserStore::new()),
            None,
        )
    }

    fn assemble(
        config: Config,
        authorizer: Authorizer,
        documents: Arc<dyn DocumentStore>,
        users: Arc<dyn UserStore>,
        db: Option<PgStore>,
    ) -> Self {
        let timeout = config.request_timeout;
        Self {
            identities: Arc::new(IdentityAllocator::new(config.machine_id)),
            authorizer: Arc::new(authorizer),
            users,
            projects: Collection::new(documents.clone(), timeout),
            scenarios: Collection::new(documents.clone(), timeout),
            testplans: Collection::new(documents.clone(), timeout),
            executions: Collection::new(documents, timeout),
            db,
            config,
        }
    }

    /// Bound a user-store call by the request timeout.
    pub async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Create the configured admin user unless it already exists.
    pub async fn bootstrap_admin(&self) -> anyhow::Result<()> {
        let (Some(username), Some(password)) =
            (&self.config.admin_username, &self.config.admin_password)
        else {
            return Ok(());
        };
        match self.users.get_user(username).await {
            Ok(_) => return Ok(()),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e).context("looking up admin user"),
        }

        let admin = NewUser {
            username: username.clone(),
            name: "Administrator".into(),
            email: format!("{}@localhost", username),
            password: password.clone(),
        };
        admin.validate().context("admin credentials rejected")?;
        let hash = password::hash_password(&admin.password)?;
        self.users
            .create_user(&admin, &hash)
            .await
            .context("creating admin user")?;
        tracing::info!(username = %username, "admin user created");
        Ok(())
    }
}

fn authorizer_for(config: &Config, sessions: Arc<dyn SessionStore>) -> anyhow::Result<Authorizer> {
    match config.auth {
        AuthScheme::Session => {
            let lifetime = chrono::Duration::from_std(config.session_ttl)
                .context("session lifetime out of range")?;
            Ok(Authorizer::Session(
                SessionAuthorizer::new(sessions)
                    .with_lifetime(lifetime)
                    .with_store_timeout(config.store_timeout),
            ))
        }
        AuthScheme::Jwt => {
            let keys = FileKeyRetriever::new(&config.security_file);
            // fail at startup rather than on the first login
            keys.get_one()?;
            let lifetime = chrono::Duration::from_std(config.signed_token_ttl)
                .context("signed token lifetime out of range")?;
            Ok(Authorizer::Signed(
                SignedTokenAuthorizer::new(Arc::new(keys)).with_lifetime(lifetime),
            ))
        }
    }
}
