mod common;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use common::*;
use iete_portal::{
    AppConfig, create_router,
    auth::{self, AuthError},
    models::User,
};
use jsonwebtoken::{EncodingKey, Header, encode, get_current_timestamp};
use tower::ServiceExt;
use uuid::Uuid;

fn bearer(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}

fn admin_roles() -> Vec<String> {
    vec!["admin".to_string()]
}

// --- authorize() ---

#[test]
fn missing_header_is_unauthenticated() {
    let result = auth::authorize(&HeaderMap::new(), "secret", &admin_roles());
    assert_eq!(result, Err(AuthError::Unauthenticated));
}

#[test]
fn non_bearer_scheme_or_empty_token_is_unauthenticated() {
    let secret = AppConfig::default().jwt_secret;
    for value in ["Basic dXNlcjpwYXNz", "Bearer ", "Bearer", "token-without-scheme"] {
        let result = auth::authorize(&bearer(value), &secret, &admin_roles());
        assert_eq!(result, Err(AuthError::Unauthenticated), "header: {value:?}");
    }
}

#[test]
fn bearer_scheme_is_case_insensitive() {
    let token = admin_token();
    let headers = bearer(&format!("bearer {token}"));
    assert_eq!(auth::bearer_token(&headers), Ok(token.as_str()));
}

#[test]
fn garbage_token_is_invalid_credential() {
    let secret = AppConfig::default().jwt_secret;
    let result = auth::authorize(&bearer("Bearer not.a.jwt"), &secret, &admin_roles());
    assert_eq!(result, Err(AuthError::InvalidCredential));
}

#[test]
fn wrong_signature_is_invalid_credential() {
    let claims = claims_with_role(Some("admin"), 3600);
    let forged = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"someone-elses-secret"),
    )
    .unwrap();
    let secret = AppConfig::default().jwt_secret;
    let result = auth::authorize(&bearer(&format!("Bearer {forged}")), &secret, &admin_roles());
    assert_eq!(result, Err(AuthError::InvalidCredential));
}

#[test]
fn expired_token_is_credential_expired_even_with_valid_signature() {
    let secret = AppConfig::default().jwt_secret;
    let token = expired_admin_token();
    let result = auth::authorize(&bearer(&format!("Bearer {token}")), &secret, &admin_roles());
    assert_eq!(result, Err(AuthError::CredentialExpired));
}

#[test]
fn role_outside_allow_list_is_forbidden() {
    let secret = AppConfig::default().jwt_secret;
    let token = viewer_token();
    let result = auth::authorize(&bearer(&format!("Bearer {token}")), &secret, &admin_roles());
    assert_eq!(result, Err(AuthError::Forbidden));
}

#[test]
fn missing_role_claim_is_forbidden() {
    let secret = AppConfig::default().jwt_secret;
    let token = sign(&claims_with_role(None, 3600));
    let result = auth::authorize(&bearer(&format!("Bearer {token}")), &secret, &admin_roles());
    assert_eq!(result, Err(AuthError::Forbidden));
}

#[test]
fn admin_token_yields_principal() {
    let secret = AppConfig::default().jwt_secret;
    let claims = claims_with_role(Some("admin"), 3600);
    let token = sign(&claims);

    let principal = auth::authorize(&bearer(&format!("Bearer {token}")), &secret, &admin_roles())
        .expect("admin token should be authorized");

    assert_eq!(principal.id, claims.sub);
    assert_eq!(principal.role, "admin");
    assert_eq!(principal.expires_at, claims.exp as i64);
}

#[test]
fn allow_list_can_admit_additional_roles() {
    let secret = AppConfig::default().jwt_secret;
    let token = viewer_token();
    let roles = vec!["admin".to_string(), "viewer".to_string()];
    let principal = auth::authorize(&bearer(&format!("Bearer {token}")), &secret, &roles).unwrap();
    assert_eq!(principal.role, "viewer");
}

#[test]
fn issued_token_round_trips_through_decode() {
    let user = User {
        id: Uuid::new_v4(),
        username: "admin".to_string(),
        password_hash: String::new(),
        role: "admin".to_string(),
    };
    let secret = "issue-secret";
    let now = get_current_timestamp();

    let (token, claims) = auth::issue_token(&user, secret, now, 120).unwrap();

    assert_eq!(claims.exp, now + 120);
    let decoded = auth::decode_credential(&token, secret).unwrap();
    assert_eq!(decoded, claims);
    assert_eq!(
        auth::decode_credential(&token, "other-secret"),
        Err(AuthError::InvalidCredential)
    );
}

#[test]
fn status_and_codes_are_distinct() {
    let errors = [
        AuthError::Unauthenticated,
        AuthError::InvalidCredential,
        AuthError::CredentialExpired,
        AuthError::Forbidden,
    ];
    let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
    assert_eq!(codes.len(), errors.len());
    assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(AuthError::CredentialExpired.status(), StatusCode::UNAUTHORIZED);
}

// --- Gate through the router ---

#[tokio::test]
async fn gate_rejections_carry_their_code() {
    let cases = [
        (None, StatusCode::UNAUTHORIZED, "unauthenticated"),
        (Some("garbage".to_string()), StatusCode::UNAUTHORIZED, "invalid_credential"),
        (Some(expired_admin_token()), StatusCode::UNAUTHORIZED, "credential_expired"),
        (Some(viewer_token()), StatusCode::FORBIDDEN, "forbidden"),
    ];

    for (token, status, code) in cases {
        let ctx = test_context();
        let app = create_router(ctx.state);
        let response = app
            .oneshot(request("GET", "/api/admin/past-events", token.as_deref()))
            .await
            .unwrap();

        assert_eq!(response.status(), status, "expected {code}");
        if status == StatusCode::UNAUTHORIZED {
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        }
        let body = body_json(response).await;
        assert_eq!(body["error"], code);
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn admin_token_passes_the_gate() {
    let ctx = test_context();
    let app = create_router(ctx.state);

    let response = app
        .oneshot(request("GET", "/api/admin/past-events", Some(&admin_token())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"].is_array());
}

#[tokio::test]
async fn session_endpoint_echoes_principal() {
    let ctx = test_context();
    let app = create_router(ctx.state);

    let response = app
        .oneshot(request("GET", "/api/admin/session", Some(&admin_token())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "tester");
    assert_eq!(body["role"], "admin");
    assert!(body["expiresAt"].as_i64().unwrap() > get_current_timestamp() as i64);
}

#[tokio::test]
async fn public_routes_ignore_bad_credentials() {
    let ctx = test_context();
    let app = create_router(ctx.state);

    let response = app
        .oneshot(request("GET", "/api/past-events", Some("garbage")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_without_credential_touches_nothing() {
    let ctx = test_context();
    let app = create_router(ctx.state.clone());

    let uri = format!("/api/admin/governing-team/{}", Uuid::new_v4());
    let response = app.oneshot(request("DELETE", &uri, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(ctx.storage.deleted_keys().await.is_empty());
}

// --- Login ---

#[tokio::test]
async fn login_issues_admin_token_with_future_expiry() {
    let ctx = test_context();
    seed_admin(&ctx.state).await;
    let app = create_router(ctx.state.clone());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD })
                .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["role"], "admin");
    assert!(body["expiresAt"].as_i64().unwrap() > get_current_timestamp() as i64);

    let claims =
        auth::decode_credential(body["token"].as_str().unwrap(), &ctx.state.config.jwt_secret)
            .unwrap();
    assert_eq!(claims.role.as_deref(), Some("admin"));
}

#[tokio::test]
async fn login_rejects_wrong_password_and_unknown_user() {
    let ctx = test_context();
    seed_admin(&ctx.state).await;

    for (username, password) in [(ADMIN_USERNAME, "wrong"), ("nobody", ADMIN_PASSWORD)] {
        let app = create_router(ctx.state.clone());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({ "username": username, "password": password }).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid username or password");
    }
}

#[tokio::test]
async fn seeding_twice_keeps_one_account_and_updates_password() {
    let ctx = test_context();
    let first = seed_admin(&ctx.state).await;
    let second = auth::seed_admin(&ctx.state.repo, ADMIN_USERNAME, "new-password", 4)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let stored = ctx.state.repo.find_user(ADMIN_USERNAME).await.unwrap().unwrap();
    assert!(auth::verify_password("new-password".to_string(), stored.password_hash).await.unwrap());
}
