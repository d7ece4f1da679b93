//! Login, logout and the cookie gate, driven through the full router
//! with in-memory backends for both token schemes.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use scratchpost::auth::Authorizer;

use common::{json_request, jwt_app, session_app, Harness, PASSWORD, USERNAME};

async fn full_cycle(h: &Harness) {
    let cookie = h.login().await;

    let (status, body) = h.get("/api/v1/projects", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, headers, _) = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let cleared = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.starts_with("auth-token=;"), "cookie not cleared: {}", cleared);

    let (status, body) = h.get("/api/v1/projects", &cookie).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

// ═══════════════════════════════════════════════════════════════════
//  Login / logout cycle
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_session_login_access_logout() {
    full_cycle(&session_app().await).await;
}

#[tokio::test]
async fn test_jwt_login_access_logout() {
    let h = jwt_app().await;
    assert_eq!(h.state.authorizer.scheme(), "jwt");
    full_cycle(&h).await;
}

#[tokio::test]
async fn test_login_sets_hardened_cookie() {
    let h = session_app().await;
    let (status, headers, body) = h
        .send(json_request(
            "POST",
            "/api/v1/login",
            None,
            &json!({ "username": USERNAME, "password": PASSWORD }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], USERNAME);
    assert!(body["expiresAt"].is_string());

    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    for attr in ["Expires=", "Path=/", "HttpOnly", "SameSite=Strict"] {
        assert!(cookie.contains(attr), "missing {} in {}", attr, cookie);
    }
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_issued_token_validates() {
    let h = session_app().await;
    let cookie = h.login().await;
    let token = cookie.trim_start_matches("auth-token=");
    let principal = tokio_test::assert_ok!(h.state.authorizer.validate(token).await);
    assert_eq!(principal.unwrap().as_str(), USERNAME);
}

// ═══════════════════════════════════════════════════════════════════
//  Rejections
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_wrong_password_is_unauthorized_without_cookie() {
    let h = session_app().await;
    for (user, pass) in [(USERNAME, "Wr0ng!pass"), ("nobody", PASSWORD)] {
        let (status, headers, body) = h
            .send(json_request(
                "POST",
                "/api/v1/login",
                None,
                &json!({ "username": user, "password": pass }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert_eq!(body["error"]["message"], "invalid username or password");
    }
}

#[tokio::test]
async fn test_login_body_errors_are_bad_request() {
    let h = session_app().await;
    for body in [
        json!({ "username": USERNAME }),
        json!({ "username": USERNAME, "password": PASSWORD, "remember": true }),
    ] {
        let (status, _, _) = h.send(json_request("POST", "/api/v1/login", None, &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
    }

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, _) = h.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_cookie_is_unauthorized() {
    let h = session_app().await;
    let req = Request::builder()
        .uri("/api/v1/projects")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/logout")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_cookie_is_bad_request() {
    for h in [session_app().await, jwt_app().await] {
        let (status, body) = h.get("/api/v1/projects", "auth-token=not-a-token").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "scheme {}", h.state.authorizer.scheme());
        assert_eq!(body["error"]["code"], "invalid_request");
    }
}

#[tokio::test]
async fn test_junk_logouts_leave_no_revocations() {
    let h = jwt_app().await;
    for i in 0..200 {
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/logout")
            .header(header::COOKIE, format!("auth-token=junk{}", i))
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = h.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    match &*h.state.authorizer {
        Authorizer::Signed(signed) => assert_eq!(signed.revoked_len(), 0),
        Authorizer::Session(_) => panic!("expected the signed scheme"),
    }
}

#[tokio::test]
async fn test_unknown_session_handle_is_unauthorized() {
    let h = session_app().await;
    let forged = format!("auth-token={}", "ab".repeat(32));
    let (status, _) = h.get("/api/v1/projects", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ═══════════════════════════════════════════════════════════════════
//  Unauthenticated surface
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health_endpoints_need_no_cookie() {
    let h = session_app().await;
    for uri in ["/healthz", "/readyz"] {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = h.send(req).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body["app"]["name"], "scratchpost");
        assert_eq!(body["app"]["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["instance"]["os"], std::env::consts::OS);
        assert_eq!(body["status"], json!([{ "ready": true, "name": "Default" }]));
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = session_app().await;
    let cookie = h.login().await;
    let (status, _) = h.get("/api/v1/widgets", &cookie).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
