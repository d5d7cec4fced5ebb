#![cfg(feature = "web")]
//! Auth flow integration tests.
//!
//! Tests cover:
//! - Registration through the form, including rejected duplicates
//! - Login by email succeeds and sets a session cookie
//! - Wrong credentials re-render the login page with an error
//! - Protected routes redirect anonymous requests to /login
//! - Logout ends the session

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bolsa::adapters::web::{AppState, LOGIN_FAILED, build_router};
use bolsa::domain::desk::TradingDesk;
use bolsa::domain::settings::TradingSettings;
use bolsa::ports::config_port::ConfigPort;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use common::*;

const TEST_EMAIL: &str = "alice@example.com";
const TEST_PASSWORD: &str = "secret123";

struct AuthMockConfigPort;

impl ConfigPort for AuthMockConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match (section, key) {
            ("auth", "session_secret") => Some(
                "00000000000000000000000000000001\
                 00000000000000000000000000000001\
                 00000000000000000000000000000001\
                 00000000000000000000000000000001"
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match (section, key) {
            ("auth", "session_lifetime") => 3600,
            _ => default,
        }
    }

    fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
        default
    }

    fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
        default
    }
}

fn trading_settings() -> TradingSettings {
    TradingSettings {
        initial_cash: 10_000.0,
        initial_exchange_rate: 18.0,
        base_currency: "USD".into(),
        home_currency: "MXN".into(),
    }
}

async fn create_auth_app() -> (Router, Arc<TradingDesk>) {
    let store = Arc::new(MockStore::new().with_instruments(&sample_instruments()));
    let desk = Arc::new(desk_over(store, 18.0, 10_000.0));
    desk.register(registration("alice")).unwrap();

    let state = AppState {
        desk: Arc::clone(&desk),
        trading: trading_settings(),
        config: Arc::new(AuthMockConfigPort),
    };
    (build_router(state).await.unwrap(), desk)
}

fn extract_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

fn build_cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .map(|sc| sc.split(';').next().unwrap_or("").to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn form_request(uri: &str, form_data: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_data))
        .unwrap()
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    form_request(
        "/login",
        format!(
            "email={}&password={}",
            email.replace('@', "%40"),
            password
        ),
    )
}

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn location(response: &axum::http::Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

async fn body_text(response: axum::http::Response<Body>) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&body).into_owned()
}

async fn logged_in_cookie(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(login_request(TEST_EMAIL, TEST_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    build_cookie_header(&extract_cookies(&response))
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn unauthenticated_dashboard_redirects_to_login() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // login_required! answers 307 with a ?next= query param
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = location(&response);
        assert!(
            location.starts_with("/login"),
            "should redirect to /login, got: {location}"
        );
    }

    #[tokio::test]
    async fn api_routes_require_login() {
        let (app, _) = create_auth_app().await;

        for uri in ["/api/exchange-rate", "/api/instruments", "/api/portfolio"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{uri}");
        }
    }

    #[tokio::test]
    async fn login_page_accessible_without_auth() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Login"));
    }

    #[tokio::test]
    async fn login_with_correct_credentials_redirects_to_dashboard() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(login_request(TEST_EMAIL, TEST_PASSWORD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");
        assert!(
            !extract_cookies(&response).is_empty(),
            "login should set a session cookie"
        );
    }

    #[tokio::test]
    async fn login_follows_local_next() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(form_request(
                "/login",
                "email=alice%40example.com&password=secret123&next=%2Fapi%2Fportfolio".into(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/api/portfolio");
    }

    #[tokio::test]
    async fn login_ignores_offsite_next() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(form_request(
                "/login",
                "email=alice%40example.com&password=secret123&next=https%3A%2F%2Fevil.example".into(),
            ))
            .await
            .unwrap();

        assert_eq!(location(&response), "/dashboard");
    }

    #[tokio::test]
    async fn login_with_wrong_password_shows_error() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(login_request(TEST_EMAIL, "wrongpassword"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(LOGIN_FAILED), "should show error message");
        assert!(html.contains(TEST_EMAIL), "should keep the typed email");
    }

    #[tokio::test]
    async fn login_with_unknown_email_shows_same_error() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(login_request("nobody@example.com", TEST_PASSWORD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(LOGIN_FAILED));
    }

    #[tokio::test]
    async fn session_grants_dashboard_access() {
        let (app, _) = create_auth_app().await;
        let cookie = logged_in_cookie(&app).await;

        let response = app
            .oneshot(get_with_cookie("/dashboard", &cookie))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Dashboard"));
        assert!(html.contains("alice"));
        assert!(html.contains("Logged in successfully"));
    }

    #[tokio::test]
    async fn logged_in_user_skips_login_form() {
        let (app, _) = create_auth_app().await;
        let cookie = logged_in_cookie(&app).await;

        let response = app
            .oneshot(get_with_cookie("/login", &cookie))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");
    }

    #[tokio::test]
    async fn logout_destroys_session() {
        let (app, _) = create_auth_app().await;
        let cookie = logged_in_cookie(&app).await;

        let response = app
            .clone()
            .oneshot(get_with_cookie("/logout", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let response = app
            .oneshot(get_with_cookie("/dashboard", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }
}

mod registration_tests {
    use super::*;

    fn register_form(username: &str, email: &str, password: &str, confirm: &str) -> Request<Body> {
        form_request(
            "/register",
            format!(
                "username={username}&email={}&password={password}&confirm_password={confirm}",
                email.replace('@', "%40")
            ),
        )
    }

    #[tokio::test]
    async fn register_page_renders() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(Request::builder().uri("/register").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Register"));
    }

    #[tokio::test]
    async fn registro_alias_redirects() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(Request::builder().uri("/registro").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/register");
    }

    #[tokio::test]
    async fn successful_registration_allows_login() {
        let (app, desk) = create_auth_app().await;

        let response = app
            .clone()
            .oneshot(register_form("bruno", "bruno@example.com", "hunter22", "hunter22"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let user = desk
            .authenticate("bruno@example.com", "hunter22")
            .unwrap()
            .expect("registered user can authenticate");
        assert_eq!(user.cash_balance, 10_000.0);

        let response = app
            .oneshot(login_request("bruno@example.com", "hunter22"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn duplicate_username_rerenders_form() {
        let (app, _) = create_auth_app().await;

        let response = app
            .oneshot(register_form("alice", "other@example.com", "secret123", "secret123"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("username is already taken"));
        assert!(html.contains("other@example.com"));
    }

    #[tokio::test]
    async fn mismatched_passwords_rejected() {
        let (app, desk) = create_auth_app().await;

        let response = app
            .oneshot(register_form("carla", "carla@example.com", "secret123", "secret124"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("passwords do not match"));
        assert!(
            desk.authenticate("carla@example.com", "secret123")
                .unwrap()
                .is_none()
        );
    }
}
