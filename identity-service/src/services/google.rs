//! Google authorization-code exchange.
//!
//! Three calls: build the authorization URL, exchange the code, fetch the profile.
//! None of them retries; codes are single-use and the user restarts the flow on failure.
//! Provider responses are parsed into loose wire structs and validated into
//! [`TokenSet`] / [`ExternalProfile`] before they go any further.

use std::time::Duration;

use reqwest::Url;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ServiceError;
use crate::config::GoogleOAuthConfig;
use crate::models::{ExternalProfile, TokenSet};

const SCOPES: &str = "openid email profile";

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleTokenResponse {
    fn validate(self) -> Result<TokenSet, ServiceError> {
        let access_token = non_empty(self.access_token).ok_or_else(|| {
            ServiceError::InvalidProviderPayload("token response without access_token".into())
        })?;
        Ok(TokenSet {
            access_token,
            refresh_token: non_empty(self.refresh_token),
            id_token: non_empty(self.id_token),
            expires_in: self.expires_in.filter(|s| *s > 0),
            scope: non_empty(self.scope),
        })
    }
}

impl GoogleUserInfo {
    fn validate(self) -> Result<ExternalProfile, ServiceError> {
        let subject = non_empty(self.sub).ok_or_else(|| {
            ServiceError::InvalidProviderPayload("profile without subject".into())
        })?;
        let email = non_empty(self.email)
            .filter(|e| e.contains('@'))
            .ok_or_else(|| ServiceError::InvalidProviderPayload("profile without email".into()))?;
        if self.email_verified != Some(true) {
            return Err(ServiceError::UnverifiedEmail);
        }
        Ok(ExternalProfile {
            subject,
            email,
            email_verified: true,
            name: non_empty(self.name),
            picture: non_empty(self.picture),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: Secret<String>,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    redirect_uri: String,
}

impl GoogleClient {
    /// `redirect_uri` comes from deployment configuration, never from a request.
    pub fn new(config: &GoogleOAuthConfig, redirect_uri: String) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
            redirect_uri,
        })
    }

    pub fn build_authorization_url(&self, state: &str) -> Result<String, ServiceError> {
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| anyhow::anyhow!("Invalid authorization URL: {}", e))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, ServiceError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, timeout = e.is_timeout(), "Google token request failed");
                ServiceError::CodeExchangeFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange error");
            return Err(ServiceError::CodeExchangeFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let payload: GoogleTokenResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google token response");
            ServiceError::InvalidProviderPayload(e.to_string())
        })?;
        payload.validate()
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<ExternalProfile, ServiceError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, timeout = e.is_timeout(), "Google profile request failed");
                ServiceError::ProfileFetchFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "Google profile fetch error");
            return Err(ServiceError::ProfileFetchFailed(format!(
                "userinfo endpoint returned {}",
                status
            )));
        }

        let payload: GoogleUserInfo = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google user info");
            ServiceError::InvalidProviderPayload(e.to_string())
        })?;
        payload.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_seconds: u64) -> GoogleClient {
        let config = GoogleOAuthConfig {
            client_id: "client-id".into(),
            client_secret: Secret::new("client-secret".into()),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/userinfo", server.uri()),
            timeout_seconds,
        };
        GoogleClient::new(&config, "http://localhost:8080/auth/google/callback".into()).unwrap()
    }

    #[tokio::test]
    async fn test_authorization_url_parameters() {
        let server = MockServer::start().await;
        let client = client_for(&server, 5);
        let url = Url::parse(&client.build_authorization_url("st-1").unwrap()).unwrap();
        let params: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "client-id");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:8080/auth/google/callback"
        );
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid email profile");
        assert_eq!(params["state"], "st-1");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
    }

    #[tokio::test]
    async fn test_exchange_and_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "g-1",
                "email": "new@x.com",
                "email_verified": true,
                "name": "New User"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 5);
        let tokens = client.exchange_code("abc").await.unwrap();
        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));

        let profile = client.fetch_profile(&tokens.access_token).await.unwrap();
        assert_eq!(profile.subject, "g-1");
        assert_eq!(profile.email, "new@x.com");
        assert!(profile.picture.is_none());
    }

    #[tokio::test]
    async fn test_non_success_is_a_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 5);
        let err = client.exchange_code("used").await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeExchangeFailed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_a_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_secs(3))
                    .set_body_json(serde_json::json!({ "sub": "g-1" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, 1);
        let err = client.fetch_profile("at").await.unwrap_err();
        assert!(matches!(err, ServiceError::ProfileFetchFailed(_)));
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": ""
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "g-1",
                "email": "new@x.com",
                "email_verified": false
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 5);
        assert!(matches!(
            client.exchange_code("abc").await.unwrap_err(),
            ServiceError::InvalidProviderPayload(_)
        ));
        assert!(matches!(
            client.fetch_profile("at").await.unwrap_err(),
            ServiceError::UnverifiedEmail
        ));
    }
}
