#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request};
use iete_portal::{
    AppConfig, AppState, InMemoryRepository, MockStorageService,
    auth::{self, Claims},
    models::User,
    repository::RepositoryState,
    storage::StorageState,
};
use jsonwebtoken::{EncodingKey, Header, encode, get_current_timestamp};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct-horse";
pub const BOUNDARY: &str = "X-IETE-TEST-BOUNDARY";

/// Handles to everything behind a test router.
pub struct TestContext {
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

pub fn test_context() -> TestContext {
    test_context_with(Arc::new(InMemoryRepository::new()), MockStorageService::new())
}

pub fn test_context_with(repo: Arc<InMemoryRepository>, storage: MockStorageService) -> TestContext {
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(storage.clone()) as StorageState,
        config: AppConfig::default(),
    };
    TestContext {
        state,
        repo,
        storage,
    }
}

/// Signs arbitrary claims with the default test secret.
pub fn sign(claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(AppConfig::default().jwt_secret.as_bytes()),
    )
    .unwrap()
}

pub fn claims_with_role(role: Option<&str>, exp_offset: i64) -> Claims {
    let now = get_current_timestamp();
    Claims {
        sub: Uuid::new_v4(),
        username: "tester".to_string(),
        role: role.map(str::to_string),
        iat: now,
        exp: now.saturating_add_signed(exp_offset),
    }
}

pub fn admin_token() -> String {
    sign(&claims_with_role(Some("admin"), 3600))
}

pub fn viewer_token() -> String {
    sign(&claims_with_role(Some("viewer"), 3600))
}

/// Valid signature and admin role, but expired well in the past.
pub fn expired_admin_token() -> String {
    sign(&claims_with_role(Some("admin"), -600))
}

pub async fn seed_admin(state: &AppState) -> User {
    auth::seed_admin(&state.repo, ADMIN_USERNAME, ADMIN_PASSWORD, 4)
        .await
        .unwrap()
}

/// One part of a hand-built multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn png(name: &str) -> Part<'_> {
    Part::File {
        name: "image",
        file_name: name,
        content_type: "image/png",
        bytes: b"\x89PNG\r\n\x1a\nfake",
    }
}

pub fn multipart_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    parts: &[Part<'_>],
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serves the router on an ephemeral port and returns its base address.
pub async fn spawn_app(state: AppState) -> String {
    let router = iete_portal::create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}
