#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Tests drive the REAL router, middleware and handlers. Persistence is the
//! in-memory user store and sessions use the tower-sessions memory store, so
//! no database or Redis is needed.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use restguard_kernel::config::Config;
use restguard_kernel::routes::build_router;
use restguard_kernel::session::session_layer;
use restguard_kernel::state::AppState;
use restguard_kernel::store::{MemoryUserStore, NewUser, UserStore};

/// Password given to every user created through [`TestApp::create_user`].
pub const PASSWORD: &str = "correct horse battery";

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryUserStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryUserStore::new());
        let state = AppState::with_store(store.clone(), &config);
        let router = build_router(state.clone())
            .layer(session_layer(MemoryStore::default(), &config.cookie_same_site));

        Self {
            router,
            store,
            state,
        }
    }

    /// Create a login-capable user holding the named roles.
    pub async fn create_user(&self, username: &str, roles: &[&str]) -> i32 {
        self.create_user_valid_until(username, roles, Utc::now() + Duration::days(1))
            .await
    }

    pub async fn create_user_valid_until(
        &self,
        username: &str,
        roles: &[&str],
        valid_time: chrono::DateTime<Utc>,
    ) -> i32 {
        let id = self
            .store
            .add_user(NewUser {
                nickname: username.to_uppercase(),
                username: username.to_string(),
                password: PASSWORD.to_string(),
                email: None,
                phone: None,
                valid_time,
                remark: String::new(),
            })
            .await
            .unwrap();

        for role in roles {
            let role_id = self.role(role).await;
            self.store.seed_assign(id, role_id);
        }
        id
    }

    /// Id of the named role, creating it if needed.
    pub async fn role(&self, name: &str) -> i32 {
        let existing = self
            .store
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.role_name == name);

        match existing {
            Some(role) => role.id,
            None => self.store.seed_role(name),
        }
    }

    /// Protect `pattern` with `role` through a root menu grant.
    pub async fn protect(&self, pattern: &str, role: &str) -> i32 {
        let menu = self.store.seed_menu(pattern, pattern, None);
        let role_id = self.role(role).await;
        self.store.seed_grant(menu, role_id);
        menu
    }

    /// Send a request through the router.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request with an optional session cookie and JSON body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.request(request).await
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        self.send(Method::GET, path, cookie, None).await
    }

    /// Log in and return the status, session cookie and response body.
    pub async fn login_as(
        &self,
        username: &str,
        password: &str,
    ) -> (StatusCode, Option<String>, Value) {
        let response = self
            .send(
                Method::POST,
                "/login",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;

        let status = response.status();
        let cookie = extract_cookie(&response);
        let body = body_json(response).await;
        (status, cookie, body)
    }

    /// Log in with [`PASSWORD`], panicking on failure.
    pub async fn login(&self, username: &str) -> String {
        let (status, cookie, body) = self.login_as(username, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        cookie.expect("login should set a session cookie")
    }
}

/// The `name=value` part of the response's session cookie.
pub fn extract_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
