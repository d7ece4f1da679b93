//! In-process backends. Used by `SCRATCHPOST_STORAGE=memory` and by tests.
//!
//! Filter and ordering rules mirror the PostgreSQL backend: equality
//! compares the scalar's text rendering, cursor comparisons only match
//! values of the cursor's type, missing fields sort first.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{CollectionSpec, DocumentStore, StoreError, UserStore, ID_PATH};
use crate::auth::session::{SessionRecord, SessionStore};
use crate::models::user::{NewUser, UserView};
use crate::query::{Clause, CursorValue, Query};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<&'static str, Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, spec: &CollectionSpec, id: &str, doc: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(spec.name).or_default();
        if docs.iter().any(|(existing_id, existing)| {
            existing_id == id || unique_key_clash(spec, existing, &doc)
        }) {
            return Err(StoreError::Duplicate);
        }
        docs.push((id.to_string(), doc));
        Ok(())
    }

    async fn get(&self, spec: &CollectionSpec, id: &str) -> Result<Value, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(spec.name)
            .and_then(|docs| docs.iter().find(|entry| entry.0 == id))
            .map(|(_, doc)| doc.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, spec: &CollectionSpec, query: &Query) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(spec.name) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<&Value> = docs
            .iter()
            .map(|(_, doc)| doc)
            .filter(|doc| query.filter.clauses.iter().all(|c| clause_matches(doc, c)))
            .collect();

        if let Some(sort) = &query.sort {
            hits.sort_by(|a, b| {
                let ord = compare_values(lookup(a, &sort.field), lookup(b, &sort.field));
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits.into_iter().cloned().collect())
    }

    async fn update(&self, spec: &CollectionSpec, id: &str, doc: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.get_mut(spec.name).ok_or(StoreError::NotFound)?;
        if docs
            .iter()
            .any(|(other_id, other)| other_id != id && unique_key_clash(spec, other, &doc))
        {
            return Err(StoreError::Duplicate);
        }
        let slot = docs
            .iter_mut()
            .find(|entry| entry.0 == id)
            .ok_or(StoreError::NotFound)?;
        slot.1 = doc;
        Ok(())
    }

    async fn delete(&self, spec: &CollectionSpec, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.get_mut(spec.name).ok_or(StoreError::NotFound)?;
        let before = docs.len();
        docs.retain(|(doc_id, _)| doc_id != id);
        if docs.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(doc, |value, segment| value.get(segment))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn unique_key_clash(spec: &CollectionSpec, existing: &Value, candidate: &Value) -> bool {
    let existing_id = lookup(existing, ID_PATH);
    if existing_id.is_some() && existing_id == lookup(candidate, ID_PATH) {
        return true;
    }
    !spec.unique.is_empty()
        && spec.unique.iter().all(|path| {
            match (lookup(existing, path), lookup(candidate, path)) {
                (Some(a), Some(b)) => !a.is_null() && a == b,
                _ => false,
            }
        })
}

fn clause_matches(doc: &Value, clause: &Clause) -> bool {
    match clause {
        Clause::Equals { field, value } => {
            lookup(doc, field).and_then(scalar_text).as_deref() == Some(value.as_str())
        }
        Clause::AnyOf { field, values } => match lookup(doc, field).and_then(scalar_text) {
            Some(text) => values.iter().any(|v| *v == text),
            None => false,
        },
        Clause::After { field, value } => {
            compare_cursor(lookup(doc, field), value) == Some(Ordering::Greater)
        }
        Clause::Before { field, value } => {
            compare_cursor(lookup(doc, field), value) == Some(Ordering::Less)
        }
    }
}

/// `None` when the stored value is not of the cursor's type.
fn compare_cursor(stored: Option<&Value>, cursor: &CursorValue) -> Option<Ordering> {
    match (stored?, cursor) {
        (Value::Number(n), CursorValue::Integer(i)) => match n.as_i64() {
            Some(stored) => Some(stored.cmp(i)),
            None => n.as_f64()?.partial_cmp(&(*i as f64)),
        },
        (Value::Number(n), CursorValue::Float(f)) => n.as_f64()?.partial_cmp(f),
        (Value::String(s), CursorValue::Text(t)) => Some(s.as_str().cmp(t.as_str())),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::String(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::Bool(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    view: UserView,
    password_hash: String,
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, StoredUser>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: &NewUser, password_hash: &str) -> Result<(), StoreError> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(StoredUser {
                    view: UserView::from(user),
                    password_hash: password_hash.to_string(),
                });
                Ok(())
            }
        }
    }

    async fn get_user(&self, username: &str) -> Result<UserView, StoreError> {
        self.users
            .get(username)
            .map(|u| u.view.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn password_hash(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self.users.get(username).map(|u| u.password_hash.clone()))
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: &SessionRecord) -> anyhow::Result<()> {
        self.sessions.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.sessions.get(session_id).map(|r| r.value().clone()))
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, record| record.expires_at >= now);
        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{compile, ListParams};
    use serde_json::json;

    const THINGS: CollectionSpec = CollectionSpec {
        name: "things",
        unique: &["projectId", "name"],
    };

    fn doc(id: &str, project: &str, name: &str, created: i64, status: &str) -> Value {
        json!({
            "identity": { "id": id, "creationTime": created },
            "projectId": project,
            "name": name,
            "status": status,
        })
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let rows = [
            ("a", "p1", "alpha", 50, "pass"),
            ("b", "p1", "bravo", 150, "fail"),
            ("c", "p2", "charlie", 100, "pass"),
            ("d", "p2", "delta", 200, "pending"),
            ("e", "p1", "echo", 10, "fail"),
        ];
        for (id, p, n, t, s) in rows {
            store.add(&THINGS, id, doc(id, p, n, t, s)).await.unwrap();
        }
        store
    }

    fn query(raw: &[(&str, &str)]) -> Query {
        compile(&ListParams::from_pairs(
            raw.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        ))
        .unwrap()
    }

    fn ids(docs: &[Value]) -> Vec<&str> {
        docs.iter()
            .map(|d| d["identity"]["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_limit_caps_page_size() {
        let store = seeded().await;
        let page = store.list(&THINGS, &query(&[("count", "2")])).await.unwrap();
        assert_eq!(ids(&page), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unsorted_list_keeps_insertion_order() {
        let store = seeded().await;
        let all = store.list(&THINGS, &Query::default()).await.unwrap();
        assert_eq!(ids(&all), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_ascending_cursor_on_nested_field() {
        let store = seeded().await;
        let page = store
            .list(
                &THINGS,
                &query(&[("sortBy", "identity.creationTime:asc"), ("lastValue", "100")]),
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_descending_cursor_on_nested_field() {
        let store = seeded().await;
        let page = store
            .list(
                &THINGS,
                &query(&[("sortBy", "identity.creationTime:desc"), ("lastValue", "100")]),
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["a", "e"]);
    }

    #[tokio::test]
    async fn test_text_cursor_pages_through_names() {
        let store = seeded().await;
        let first = store
            .list(&THINGS, &query(&[("sortBy", "name"), ("count", "2")]))
            .await
            .unwrap();
        assert_eq!(ids(&first), vec!["a", "b"]);

        let next = store
            .list(
                &THINGS,
                &query(&[("sortBy", "name"), ("count", "2"), ("lastValue", "bravo")]),
            )
            .await
            .unwrap();
        assert_eq!(ids(&next), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_or_and_and_filters() {
        let store = seeded().await;
        let either = store
            .list(&THINGS, &query(&[("status", "pass"), ("status", "pending")]))
            .await
            .unwrap();
        assert_eq!(ids(&either), vec!["a", "c", "d"]);

        let both = store
            .list(&THINGS, &query(&[("status", "fail"), ("projectId", "p1")]))
            .await
            .unwrap();
        assert_eq!(ids(&both), vec!["b", "e"]);
    }

    #[tokio::test]
    async fn test_numeric_field_matches_textual_filter() {
        let store = seeded().await;
        let hit = store
            .list(&THINGS, &query(&[("identity.creationTime", "150")]))
            .await
            .unwrap();
        assert_eq!(ids(&hit), vec!["b"]);
    }

    #[tokio::test]
    async fn test_text_cursor_skips_numeric_values() {
        let store = seeded().await;
        let none = store
            .list(
                &THINGS,
                &query(&[("sortBy", "identity.creationTime"), ("lastValue", "abc")]),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_and_compound_key() {
        let store = seeded().await;
        let same_id = store.add(&THINGS, "a", doc("a", "p9", "zulu", 1, "pass")).await;
        assert!(matches!(same_id, Err(StoreError::Duplicate)));

        let same_key = store.add(&THINGS, "z", doc("z", "p1", "alpha", 1, "pass")).await;
        assert!(matches!(same_key, Err(StoreError::Duplicate)));

        // same name in another project is fine
        store.add(&THINGS, "y", doc("y", "p2", "alpha", 1, "pass")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_respects_unique_keys() {
        let store = seeded().await;
        let clash = store.update(&THINGS, "b", doc("b", "p1", "alpha", 150, "fail")).await;
        assert!(matches!(clash, Err(StoreError::Duplicate)));

        store.update(&THINGS, "b", doc("b", "p1", "bravo", 150, "pass")).await.unwrap();
        assert_eq!(store.get(&THINGS, "b").await.unwrap()["status"], "pass");
    }

    #[tokio::test]
    async fn test_missing_items_are_not_found() {
        let store = seeded().await;
        assert!(matches!(store.get(&THINGS, "nope").await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete(&THINGS, "nope").await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.update(&THINGS, "nope", json!({})).await,
            Err(StoreError::NotFound)
        ));

        store.delete(&THINGS, "a").await.unwrap();
        assert!(matches!(store.get(&THINGS, "a").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_user_store_rejects_duplicates() {
        let users = MemoryUserStore::new();
        let user = NewUser {
            username: "alice".into(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password: "Secret1!".into(),
        };
        users.create_user(&user, "hash").await.unwrap();
        assert!(matches!(
            users.create_user(&user, "hash").await,
            Err(StoreError::Duplicate)
        ));
        assert_eq!(users.get_user("alice").await.unwrap().email, "alice@example.com");
        assert_eq!(users.password_hash("alice").await.unwrap().as_deref(), Some("hash"));
        assert_eq!(users.password_hash("bob").await.unwrap(), None);
    }
}
