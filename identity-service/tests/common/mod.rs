//! Test helpers for identity-service integration tests.
//!
//! Every test app runs on the in-memory store with a settable clock, and talks to a
//! wiremock server standing in for Google.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use identity_service::{
    build_router,
    config::IdentityConfig,
    services::{InMemoryIdentityStore, ManualClock},
    AppState,
};
use reqwest::Url;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BASE_URL: &str = "http://app.test";
pub const SIGNING_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryIdentityStore>,
    pub clock: Arc<ManualClock>,
    pub google: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let google = MockServer::start().await;
        let vars: HashMap<String, String> = [
            ("DEV_BASE_URL", BASE_URL.to_string()),
            ("TOKEN_SIGNING_SECRET", SIGNING_SECRET.to_string()),
            ("GOOGLE_CLIENT_ID", "test-client".to_string()),
            ("GOOGLE_CLIENT_SECRET", "test-secret".to_string()),
            ("GOOGLE_AUTH_URL", format!("{}/authorize", google.uri())),
            ("GOOGLE_TOKEN_URL", format!("{}/token", google.uri())),
            ("GOOGLE_USERINFO_URL", format!("{}/userinfo", google.uri())),
            ("GOOGLE_TIMEOUT_SECONDS", "1".to_string()),
            ("SERVICE_NAME", "identity-service-test".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let config = IdentityConfig::from_source(CommonConfig::default(), |key| {
            vars.get(key).cloned()
        })
        .expect("Failed to build test configuration");

        let store = Arc::new(InMemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::default());
        let state = AppState::new(config, store.clone(), clock.clone())
            .expect("Failed to build application state");

        Self {
            router: build_router(state.clone()),
            state,
            store,
            clock,
            google,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = session {
            builder = builder.header(header::COOKIE, format!("session_token={}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, session: Option<&str>) -> Response<Body> {
        self.json_request("POST", uri, body, session).await
    }

    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Value,
        session: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = session {
            builder = builder.header(header::COOKIE, format!("session_token={}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Register a password user and return its session token.
    pub async fn register(&self, email: &str, password: &str) -> String {
        let response = self
            .post_json(
                "/auth/register",
                json!({ "email": email, "password": password, "name": "Test User" }),
                None,
            )
            .await;
        assert_eq!(response.status(), 201);
        session_token(&response).expect("register must set the session cookie")
    }

    /// Start a Google sign-in and return the issued state token.
    pub async fn start_signin(&self) -> String {
        let response = self.get("/auth/google", None).await;
        assert_eq!(response.status(), 303);
        query_param(&location(&response), "state").expect("authorization URL carries state")
    }

    /// Start a Google link for the given session and return the issued state token.
    pub async fn start_link(&self, session: &str) -> String {
        let response = self.get("/auth/google/link", Some(session)).await;
        assert_eq!(response.status(), 303);
        query_param(&location(&response), "state").expect("authorization URL carries state")
    }

    /// Serve a successful code exchange and profile for `code`.
    pub async fn mock_google_profile(&self, code: &str, profile: Value) {
        let access_token = format!("access-{}", code);
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("code={}", code)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": "refresh-token",
                "expires_in": 3599,
                "scope": "openid email profile",
                "token_type": "Bearer"
            })))
            .mount(&self.google)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header_matcher(
                "authorization",
                format!("Bearer {}", access_token).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile))
            .mount(&self.google)
            .await;
    }

    /// Complete a Google sign-in for `subject` and return the session token.
    pub async fn google_signup(&self, code: &str, subject: &str, email: &str) -> String {
        let state = self.start_signin().await;
        self.mock_google_profile(code, google_profile(subject, email))
            .await;
        let response = self.callback(code, &state, None).await;
        assert_eq!(response.status(), 303);
        session_token(&response).expect("sign-in sets the session cookie")
    }

    pub async fn callback(&self, code: &str, state: &str, session: Option<&str>) -> Response<Body> {
        self.get(
            &format!("/auth/google/callback?code={}&state={}", code, state),
            session,
        )
        .await
    }
}

pub fn google_profile(subject: &str, email: &str) -> Value {
    json!({
        "sub": subject,
        "email": email,
        "email_verified": true,
        "name": "Google User",
        "picture": "https://lh3.example/photo.png"
    })
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("response has a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn query_param(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Value of the session cookie set by the response, when it sets a non-empty one.
pub fn session_token(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.strip_prefix("session_token="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
        .find(|v| !v.is_empty())
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
