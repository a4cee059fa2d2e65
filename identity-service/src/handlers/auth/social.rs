//! Google sign-in and account linking.
//!
//! The callback never answers with a JSON error: every outcome is a redirect carrying
//! a fixed human-readable message.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{OAuthCallbackQuery, OAuthStartQuery},
    handlers::cookies::{session_cookie, SESSION_COOKIE},
    middleware::{AuthUser, ClientInfo},
    models::{OAuthIntent, OAuthPurpose, Provider, StateRecord},
    services::{ReconcileOutcome, ServiceError},
    AppState,
};

const GENERIC_FAILURE: &str = "Sign-in failed. Please try again.";
const CANCELLED: &str = "Google sign-in was cancelled.";
const INVALID_STATE: &str = "Your sign-in request expired or was invalid. Please try again.";
const EXCHANGE_FAILED: &str = "Could not complete Google sign-in. Please try again.";
const PROFILE_FAILED: &str = "Could not read your Google profile. Please try again.";

const LOGIN_PATH: &str = "/login";

/// Accept only same-site relative paths as post-auth targets.
pub fn safe_redirect_target(target: Option<String>) -> Option<String> {
    let target = target?.trim().to_string();
    let allowed = target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && !target.chars().any(char::is_control);
    allowed.then_some(target)
}

/// Append `key=value` to the query of `path`, keeping any fragment last.
fn with_query(path: &str, key: &str, value: &str) -> String {
    let (path, fragment) = match path.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (path, None),
    };
    let separator = if path.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{}{}{}={}",
        path,
        separator,
        key,
        urlencoding::encode(value)
    );
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    url
}

/// Start a `signin` round-trip.
///
/// GET /auth/google
pub async fn google_signin(
    State(state): State<AppState>,
    Query(query): Query<OAuthStartQuery>,
) -> Result<Redirect, AppError> {
    let token = state
        .oauth_states
        .issue(
            Provider::Google,
            OAuthPurpose::Signin,
            None,
            safe_redirect_target(query.redirect),
        )
        .await?;
    let url = state.google.build_authorization_url(&token)?;
    Ok(Redirect::to(&url))
}

/// Start a `link` round-trip bound to the authenticated caller.
///
/// GET /auth/google/link
pub async fn google_link(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OAuthStartQuery>,
) -> Result<Redirect, AppError> {
    user.require_session()?;
    let token = state
        .oauth_states
        .issue(
            Provider::Google,
            OAuthPurpose::Link,
            Some(user.identity.user_id),
            safe_redirect_target(query.redirect),
        )
        .await?;
    let url = state.google.build_authorization_url(&token)?;
    Ok(Redirect::to(&url))
}

/// Where a callback ends up, depending on what the state said.
struct Destination<'a> {
    base: &'a str,
    record: Option<&'a StateRecord>,
}

impl Destination<'_> {
    fn target(&self) -> &str {
        self.record
            .and_then(|r| r.redirect_target.as_deref())
            .unwrap_or("/")
    }

    fn is_link(&self) -> bool {
        matches!(
            self.record.map(|r| r.intent),
            Some(OAuthIntent::Link { .. })
        )
    }

    fn failure(&self, message: &str) -> Redirect {
        let path = if self.is_link() {
            self.target()
        } else {
            LOGIN_PATH
        };
        Redirect::to(&format!("{}{}", self.base, with_query(path, "error", message)))
    }

    fn success(&self) -> Redirect {
        Redirect::to(&format!("{}{}", self.base, self.target()))
    }

    fn linked(&self, provider: Provider) -> Redirect {
        Redirect::to(&format!(
            "{}{}",
            self.base,
            with_query(self.target(), "linked", provider.as_str())
        ))
    }
}

/// Provider callback.
///
/// GET /auth/google/callback
pub async fn google_callback(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    jar: CookieJar,
    query: Option<Query<OAuthCallbackQuery>>,
) -> (CookieJar, Redirect) {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let base = state.config.base_url().to_string();

    let code = query.code.filter(|c| !c.is_empty());
    let state_token = query.state.filter(|s| !s.is_empty());
    let provider_error = query.error.filter(|e| !e.is_empty());

    // Consume the state first, whatever else happens, so it can never be replayed.
    let record = match &state_token {
        Some(token) => match state.oauth_states.redeem(token).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, step = "redeem_state", "OAuth state lookup failed");
                let dest = Destination { base: &base, record: None };
                return (jar, dest.failure(GENERIC_FAILURE));
            }
        },
        None => None,
    };
    let dest = Destination {
        base: &base,
        record: record.as_ref(),
    };

    if let Some(error) = provider_error {
        tracing::info!(
            provider = %Provider::Google,
            purpose = ?record.as_ref().map(|r| r.purpose()),
            error = %error,
            "Provider reported authorization failure"
        );
        return (jar, dest.failure(CANCELLED));
    }

    let (Some(code), Some(_)) = (code, state_token.as_ref()) else {
        tracing::warn!(step = "parse_callback", "Callback without code or state");
        return (jar, dest.failure(GENERIC_FAILURE));
    };

    let Some(record) = record.as_ref() else {
        tracing::warn!(step = "redeem_state", "Invalid, expired or replayed OAuth state");
        return (jar, dest.failure(INVALID_STATE));
    };

    let provider = record.provider;
    let purpose = record.purpose();

    let tokens = match state.google.exchange_code(&code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            log_failure(provider, purpose, "exchange_code", &e);
            return (jar, dest.failure(EXCHANGE_FAILED));
        }
    };

    let profile = match state.google.fetch_profile(&tokens.access_token).await {
        Ok(profile) => profile,
        Err(e) => {
            log_failure(provider, purpose, "fetch_profile", &e);
            return (jar, dest.failure(PROFILE_FAILED));
        }
    };

    let caller_session = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let outcome = state
        .reconciliation
        .reconcile(record, &profile, &tokens, caller_session.as_deref(), &client)
        .await;

    match outcome {
        Ok(ReconcileOutcome::SignedIn { session, .. }) => {
            let jar = jar.add(session_cookie(session.token, state.config.cookie_secure()));
            (jar, dest.success())
        }
        Ok(ReconcileOutcome::Linked { .. }) => (jar, dest.linked(provider)),
        Ok(ReconcileOutcome::Rejected(reason)) => (jar, dest.failure(&reason.message(provider))),
        Err(e) => {
            log_failure(provider, purpose, "reconcile", &e);
            (jar, dest.failure(GENERIC_FAILURE))
        }
    }
}

fn log_failure(provider: Provider, purpose: OAuthPurpose, step: &str, err: &ServiceError) {
    tracing::error!(
        provider = %provider,
        purpose = %purpose,
        step = step,
        error = %err,
        "OAuth callback failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_redirect_target() {
        assert_eq!(
            safe_redirect_target(Some("/profile".into())).as_deref(),
            Some("/profile")
        );
        assert_eq!(
            safe_redirect_target(Some("/lessons?id=3".into())).as_deref(),
            Some("/lessons?id=3")
        );
        assert_eq!(safe_redirect_target(Some("//evil.example".into())), None);
        assert_eq!(safe_redirect_target(Some("https://evil.example".into())), None);
        assert_eq!(safe_redirect_target(Some("/\\evil.example".into())), None);
        assert_eq!(safe_redirect_target(None), None);
    }

    #[test]
    fn test_with_query_encodes_and_appends() {
        assert_eq!(
            with_query("/login", "error", "Sign-in failed. Please try again."),
            "/login?error=Sign-in%20failed.%20Please%20try%20again."
        );
        assert_eq!(
            with_query("/lessons?id=3", "linked", "google"),
            "/lessons?id=3&linked=google"
        );
    }

    #[test]
    fn test_with_query_keeps_fragment_last() {
        assert_eq!(
            with_query("/profile#google", "error", "boom"),
            "/profile?error=boom#google"
        );
        assert_eq!(
            with_query("/lessons?id=3#top", "linked", "google"),
            "/lessons?id=3&linked=google#top"
        );
    }
}
