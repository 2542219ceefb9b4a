use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode, multipart::Form};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    client::{
        session::{Navigator, View},
        token_store::TokenStore,
    },
    models::{ErrorBody, LoginRequest, LoginResponse},
};

/// Base URL used by the dashboard when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Shown to the user after the server rejected the stored credential.
pub const SESSION_EXPIRED_NOTICE: &str =
    "Your session has expired or is invalid. Please log in again.";

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered 401 or 403. The stored credential has already been discarded.
    #[error("session rejected ({status}): {message}")]
    SessionRejected { status: StatusCode, message: String },

    #[error("request failed ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::SessionRejected { status, .. } | ClientError::Api { status, .. } => {
                Some(*status)
            }
            ClientError::Transport(err) => err.status(),
        }
    }
}

/// ApiClient
///
/// Single entry point for calls to the portal API. Attaches `Authorization: Bearer <token>` whenever
/// the token store holds a credential. A 401 or 403 answer clears the store, sends the user to the
/// login view with a notice, and is still returned to the caller as `SessionRejected`.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            store,
            navigator,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.store.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn dispatch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = error_message(response).await;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(%status, %message, "credential rejected, signing out");
            self.store.clear();
            self.navigator.navigate(View::Login);
            self.navigator.notify(SESSION_EXPIRED_NOTICE);
            return Err(ClientError::SessionRejected { status, message });
        }
        Err(ClientError::Api { status, message })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.dispatch(self.http.get(self.url(path))).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.dispatch(self.http.post(self.url(path)).json(body)).await
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<T, ClientError> {
        self.dispatch(self.http.post(self.url(path)).multipart(form))
            .await
    }

    pub async fn put_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<T, ClientError> {
        self.dispatch(self.http.put(self.url(path)).multipart(form))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.dispatch(self.http.delete(self.url(path))).await
    }

    /// login
    ///
    /// Exchanges username and password for a credential. Sent without a bearer header and never
    /// intercepted: a 401 here is a wrong password, not an expired session.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let response = self
            .http
            .post(self.url("auth/login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(ClientError::Api { status, message });
        }
        Ok(response.json::<LoginResponse>().await?)
    }
}

/// Best effort: the server's `{ message }` body, else the status reason.
async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
