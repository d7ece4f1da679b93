use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{path_segments, CollectionSpec, DocumentStore, StoreError, UserStore};
use crate::auth::session::{SessionRecord, SessionStore};
use crate::models::user::{NewUser, UserView};
use crate::query::{Clause, CursorValue, Query};

/// Table created by the initial migration and targeted by every session
/// statement below.
pub const SESSIONS_TABLE: &str = "sessions";

const INSERT_SESSION: &str =
    "INSERT INTO sessions (username, sessionid, expirationtime) VALUES ($1, $2, $3)";
const SELECT_SESSION: &str =
    "SELECT username, sessionid, expirationtime FROM sessions WHERE sessionid = $1";
const DELETE_SESSION: &str = "DELETE FROM sessions WHERE sessionid = $1";
const DELETE_EXPIRED_SESSIONS: &str = "DELETE FROM sessions WHERE expirationtime < $1";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the per-collection unique indexes. Idempotent.
    pub async fn ensure_indexes(&self, specs: &[CollectionSpec]) -> anyhow::Result<()> {
        for spec in specs.iter().filter(|s| !s.unique.is_empty()) {
            let sql = unique_index_sql(spec);
            sqlx::query(&sql).execute(&self.pool).await?;
            tracing::debug!(collection = spec.name, "unique index ensured");
        }
        Ok(())
    }
}

fn unique_index_sql(spec: &CollectionSpec) -> String {
    let columns = spec
        .unique
        .iter()
        .map(|path| format!("(body #>> '{{{}}}')", path.replace('.', ",")))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS documents_{name}_unique ON documents ({columns}) WHERE collection = '{name}'",
        name = spec.name,
        columns = columns,
    )
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate
        }
        _ => StoreError::Backend(e.into()),
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, clause: &Clause) {
    match clause {
        Clause::Equals { field, value } => {
            qb.push("body #>> ");
            qb.push_bind(path_segments(field));
            qb.push(" = ");
            qb.push_bind(value.clone());
        }
        Clause::AnyOf { field, values } => {
            qb.push("body #>> ");
            qb.push_bind(path_segments(field));
            qb.push(" = ANY(");
            qb.push_bind(values.clone());
            qb.push(")");
        }
        Clause::After { field, value } => push_cursor(qb, field, value, ">"),
        Clause::Before { field, value } => push_cursor(qb, field, value, "<"),
    }
}

fn push_cursor(qb: &mut QueryBuilder<'_, Postgres>, field: &str, value: &CursorValue, op: &str) {
    let path = path_segments(field);
    match value {
        CursorValue::Integer(i) => {
            qb.push("(jsonb_typeof(body #> ");
            qb.push_bind(path.clone());
            qb.push(") = 'number' AND body #> ");
            qb.push_bind(path);
            qb.push(format!(" {} to_jsonb(", op));
            qb.push_bind(*i);
            qb.push("::bigint))");
        }
        CursorValue::Float(f) => {
            qb.push("(jsonb_typeof(body #> ");
            qb.push_bind(path.clone());
            qb.push(") = 'number' AND body #> ");
            qb.push_bind(path);
            qb.push(format!(" {} to_jsonb(", op));
            qb.push_bind(*f);
            qb.push("::float8))");
        }
        CursorValue::Text(t) => {
            qb.push("(jsonb_typeof(body #> ");
            qb.push_bind(path.clone());
            qb.push(") = 'string' AND body #>> ");
            qb.push_bind(path);
            qb.push(format!(" {} ", op));
            qb.push_bind(t.clone());
            qb.push(")");
        }
    }
}

fn list_query<'a>(spec: &CollectionSpec, query: &Query) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("SELECT body FROM documents WHERE collection = ");
    qb.push_bind(spec.name);
    for clause in &query.filter.clauses {
        qb.push(" AND ");
        push_clause(&mut qb, clause);
    }
    match &query.sort {
        Some(sort) => {
            qb.push(" ORDER BY body #> ");
            qb.push_bind(path_segments(&sort.field));
            qb.push(if sort.descending {
                " DESC NULLS LAST, seq DESC"
            } else {
                " ASC NULLS FIRST, seq ASC"
            });
        }
        None => {
            qb.push(" ORDER BY seq ASC");
        }
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
    qb
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn add(&self, spec: &CollectionSpec, id: &str, doc: Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(spec.name)
            .bind(id)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn get(&self, spec: &CollectionSpec, id: &str) -> Result<Value, StoreError> {
        sqlx::query_scalar::<_, Value>(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(spec.name)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn list(&self, spec: &CollectionSpec, query: &Query) -> Result<Vec<Value>, StoreError> {
        let mut qb = list_query(spec, query);
        qb.build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn update(&self, spec: &CollectionSpec, id: &str, doc: Value) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND id = $2")
            .bind(spec.name)
            .bind(id)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(spec.name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &NewUser, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (username, name, email, password) VALUES ($1, $2, $3, $4)")
            .bind(&user.username)
            .bind(&user.name)
            .bind(&user.email)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<UserView, StoreError> {
        sqlx::query_as::<_, UserView>("SELECT username, name, email FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn password_hash(&self, username: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert(&self, record: &SessionRecord) -> anyhow::Result<()> {
        sqlx::query(INSERT_SESSION)
            .bind(&record.username)
            .bind(&record.session_id)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRecord>(SELECT_SESSION)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        sqlx::query(DELETE_SESSION)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(DELETE_EXPIRED_SESSIONS)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
