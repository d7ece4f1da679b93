//! Shared harness: an in-memory app plus request helpers.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use scratchpost::auth::keys::StaticKey;
use scratchpost::auth::{password, Authorizer, SessionAuthorizer, SignedTokenAuthorizer};
use scratchpost::config::{Config, StorageBackend};
use scratchpost::models::user::NewUser;
use scratchpost::store::memory::MemorySessionStore;
use scratchpost::{api, AppState};

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "S3cret!pw";

pub struct Harness {
    pub state: Arc<AppState>,
    pub app: Router,
}

pub async fn session_app() -> Harness {
    let sessions = Arc::new(MemorySessionStore::new());
    let authorizer = Authorizer::Session(SessionAuthorizer::new(sessions));
    harness(authorizer).await
}

pub async fn jwt_app() -> Harness {
    let key = StaticKey::new(b"integration-test-signing-key".to_vec());
    harness(Authorizer::Signed(SignedTokenAuthorizer::new(Arc::new(key)))).await
}

async fn harness(authorizer: Authorizer) -> Harness {
    let config = Config {
        storage: StorageBackend::Memory,
        ..Config::default()
    };
    let state = Arc::new(AppState::memory(config, authorizer));

    let user = NewUser {
        username: USERNAME.into(),
        name: "Test User".into(),
        email: "tester@example.com".into(),
        password: PASSWORD.into(),
    };
    let hash = password::hash_password(PASSWORD).unwrap();
    state.users.create_user(&user, &hash).await.unwrap();

    Harness {
        app: api::app(state.clone()),
        state,
    }
}

impl Harness {
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    /// Log in as the seeded user and return the `auth-token=...` pair.
    pub async fn login(&self) -> String {
        let (status, headers, _) = self
            .send(json_request(
                "POST",
                "/api/v1/login",
                None,
                &serde_json::json!({ "username": USERNAME, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let set_cookie = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("login sets a cookie");
        set_cookie.split(';').next().unwrap().to_string()
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = self.send(req).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: &Value) -> (StatusCode, Value) {
        let (status, _, body) = self.send(json_request("POST", uri, Some(cookie), body)).await;
        (status, body)
    }

    pub async fn put(&self, uri: &str, cookie: &str, body: &Value) -> (StatusCode, Value) {
        let (status, _, body) = self.send(json_request("PUT", uri, Some(cookie), body)).await;
        (status, body)
    }

    pub async fn delete(&self, uri: &str, cookie: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = self.send(req).await;
        (status, body)
    }
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn id_of(body: &Value) -> String {
    body["identity"]["id"].as_str().expect("response has an id").to_string()
}
