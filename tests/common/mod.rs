#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use recipe_api::{app::build_app, state::AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const CREATE_USER_URL: &str = "/api/user/create";
pub const TOKEN_URL: &str = "/api/user/token";
pub const ME_URL: &str = "/api/user/me";
pub const TAGS_URL: &str = "/api/recipe/tags";
pub const INGREDIENTS_URL: &str = "/api/recipe/ingredients";
pub const RECIPES_URL: &str = "/api/recipe/recipes";

pub fn recipe_url(id: i64) -> String {
    format!("{RECIPES_URL}/{id}")
}

pub fn test_app() -> (Router, AppState) {
    let state = AppState::fake();
    (build_app(state.clone()), state)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let authorization = token.map(|t| format!("Bearer {t}"));
    send_with_authorization(app, method, uri, authorization.as_deref(), body).await
}

/// Like [`send`] but with the raw `Authorization` header value.
pub async fn send_with_authorization(
    app: &Router,
    method: &str,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        req = req.header(header::AUTHORIZATION, value);
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Register `email` and return a token for it.
pub async fn signup_and_login(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        "POST",
        CREATE_USER_URL,
        None,
        Some(json!({"email": email, "password": "password123", "name": "Test User"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        "POST",
        TOKEN_URL,
        None,
        Some(json!({"email": email, "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}
