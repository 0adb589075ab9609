//! Integration tests for the Google Calendar connect flow.
//!
//! Covers the start redirect shape, provider-denied and state-mismatch
//! callbacks (no token exchange may happen), the full happy path, and
//! callback replay.

use std::sync::Arc;

use coach_portal::repositories::{ClientRepository, OAuthStateRepository};
use reqwest::StatusCode;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{no_redirect_client, session_cookie, spawn_app, test_config, test_user};

#[tokio::test]
async fn start_redirects_to_google_consent_screen() {
    let config = test_config();
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, _db, server) = spawn_app(config, sessions).await;

    let response = no_redirect_client()
        .get(format!("{}/connect/google/start", server_url))
        .header("cookie", session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = Url::parse(
        response
            .headers()
            .get("location")
            .unwrap()
            .to_str()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(location.host_str(), Some("accounts.google.com"));

    let pairs: std::collections::HashMap<_, _> = location.query_pairs().collect();
    assert_eq!(pairs["access_type"], "offline");
    assert_eq!(pairs["response_type"], "code");
    assert!(!pairs["state"].is_empty());
    assert_eq!(
        pairs["redirect_uri"],
        "https://portal.example.com/connect/google/callback"
    );

    // The state nonce is mirrored into a scoped, short-lived cookie
    let set_cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("google_oauth_state="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=600"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_without_session_redirects_to_login() {
    let config = test_config();
    let sessions = Arc::new(test_utils::StaticSessions::empty());
    let (server_url, _db, server) = spawn_app(config, sessions).await;

    let response = no_redirect_client()
        .get(format!("{}/connect/google/start", server_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.starts_with("https://portal.example.com/login"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_without_credentials_reports_missing_env() {
    let mut config = test_config();
    config.google_client_id = None;
    config.google_client_secret = None;
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, _db, server) = spawn_app(config, sessions).await;

    let response = no_redirect_client()
        .get(format!("{}/connect/google/start", server_url))
        .header("cookie", session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.contains("/dashboard/connections"));
    assert!(location.contains("error=missing_google_env"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn provider_denial_short_circuits_before_token_exchange() {
    let mock_google = MockServer::start().await;
    // The token endpoint must never be called for a denied callback
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_google)
        .await;

    let mut config = test_config();
    config.google_token_base = mock_google.uri();
    config.google_api_base = mock_google.uri();
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, _db, server) = spawn_app(config, sessions).await;

    let response = no_redirect_client()
        .get(format!(
            "{}/connect/google/callback?error=access_denied",
            server_url
        ))
        .header("cookie", session_cookie())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.contains("status=error"));
    assert!(location.contains("error=access_denied"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn state_mismatch_rejects_before_token_exchange() {
    let mock_google = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_google)
        .await;

    let mut config = test_config();
    config.google_token_base = mock_google.uri();
    config.google_api_base = mock_google.uri();
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, db, server) = spawn_app(config, sessions).await;

    // A state was issued, but the callback returns a different value
    let states = OAuthStateRepository::new(Arc::new(db.as_ref().clone()));
    states
        .create(test_user().id, "google", "issued-nonce", 10)
        .await
        .unwrap();

    let response = no_redirect_client()
        .get(format!(
            "{}/connect/google/callback?code=auth-code&state=forged-nonce",
            server_url
        ))
        .header(
            "cookie",
            format!("{}; google_oauth_state=issued-nonce", session_cookie()),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.contains("error=invalid_state"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_code_is_a_terminal_error() {
    let config = test_config();
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, _db, server) = spawn_app(config, sessions).await;

    let response = no_redirect_client()
        .get(format!("{}/connect/google/callback", server_url))
        .header("cookie", session_cookie())
        .send()
        .await
        .unwrap();

    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.contains("error=missing_code"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn successful_callback_persists_calendar_and_clears_cookie() {
    let mock_google = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
        })))
        .expect(1)
        .mount(&mock_google)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "team@group.calendar.google.com"},
                {"id": "coach@example.com", "primary": true},
            ]
        })))
        .expect(1)
        .mount(&mock_google)
        .await;

    let mut config = test_config();
    config.google_token_base = mock_google.uri();
    config.google_api_base = mock_google.uri();
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, db, server) = spawn_app(config, sessions).await;

    let states = OAuthStateRepository::new(Arc::new(db.as_ref().clone()));
    states
        .create(test_user().id, "google", "issued-nonce", 10)
        .await
        .unwrap();

    let response = no_redirect_client()
        .get(format!(
            "{}/connect/google/callback?code=auth-code&state=issued-nonce",
            server_url
        ))
        .header(
            "cookie",
            format!("{}; google_oauth_state=issued-nonce", session_cookie()),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.contains("provider=google"));
    assert!(location.contains("status=connected"));

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("google_oauth_state=;"));
    assert!(set_cookie.contains("Max-Age=0"));

    let clients = ClientRepository::new(Arc::new(db.as_ref().clone()));
    let row = clients.find_by_user(&test_user().id).await.unwrap().unwrap();
    assert_eq!(row.google_calendar_id.as_deref(), Some("coach@example.com"));
    assert_eq!(row.google_refresh_token.as_deref(), Some("1//refresh"));
    assert!(row.google_connected_at.is_some());
    assert_eq!(row.email.as_deref(), Some("coach@example.com"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn replayed_callback_fails_state_validation_without_corrupting_store() {
    let mock_google = MockServer::start().await;
    // Exactly one exchange: the replay is rejected at state validation
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
        })))
        .expect(1)
        .mount(&mock_google)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "coach@example.com", "primary": true}]
        })))
        .mount(&mock_google)
        .await;

    let mut config = test_config();
    config.google_token_base = mock_google.uri();
    config.google_api_base = mock_google.uri();
    let sessions = Arc::new(test_utils::StaticSessions::with_user(test_user()));
    let (server_url, db, server) = spawn_app(config, sessions).await;

    let states = OAuthStateRepository::new(Arc::new(db.as_ref().clone()));
    states
        .create(test_user().id, "google", "issued-nonce", 10)
        .await
        .unwrap();

    let callback_url = format!(
        "{}/connect/google/callback?code=auth-code&state=issued-nonce",
        server_url
    );
    let cookies = format!("{}; google_oauth_state=issued-nonce", session_cookie());

    let first = no_redirect_client()
        .get(&callback_url)
        .header("cookie", &cookies)
        .send()
        .await
        .unwrap();
    let first_location = first.headers().get("location").unwrap().to_str().unwrap();
    assert!(first_location.contains("status=connected"));

    // Same request again: the nonce was consumed, so validation fails
    let second = no_redirect_client()
        .get(&callback_url)
        .header("cookie", &cookies)
        .send()
        .await
        .unwrap();
    let second_location = second.headers().get("location").unwrap().to_str().unwrap();
    assert!(second_location.contains("error=invalid_state"));

    // The stored connection is untouched by the replay
    let clients = ClientRepository::new(Arc::new(db.as_ref().clone()));
    let row = clients.find_by_user(&test_user().id).await.unwrap().unwrap();
    assert_eq!(row.google_calendar_id.as_deref(), Some("coach@example.com"));

    server.shutdown().await.unwrap();
}
