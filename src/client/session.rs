use std::sync::Arc;

use crate::{
    client::{
        gateway::{ApiClient, ClientError},
        token_store::TokenStore,
    },
    models::LoginResponse,
};

pub const LOGIN_PATH: &str = "/admin/login";
pub const ADMIN_HOME_PATH: &str = "/admin/past-events";

const PUBLIC_PATHS: [&str; 5] = ["/", "/all-events", "/ourevents", "/about", "/ourteam"];

const ADMIN_PAGES: [&str; 10] = [
    "past-events",
    "past-events/manage",
    "upcoming-events",
    "upcoming-events/manage",
    "governing-team",
    "governing-team/manage",
    "electromazine",
    "electromazine/manage",
    "our-team-journey",
    "edit-our-team-journey",
];

/// View
///
/// What the dashboard renders for a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// A page of the public site, by path.
    Public(String),
    Login,
    /// A dashboard page, by full path (e.g. `/admin/past-events`).
    Admin(String),
}

impl View {
    pub fn admin_home() -> Self {
        View::Admin(ADMIN_HOME_PATH.to_string())
    }

    pub fn path(&self) -> &str {
        match self {
            View::Public(path) | View::Admin(path) => path,
            View::Login => LOGIN_PATH,
        }
    }
}

/// Navigator
///
/// The view layer's side of the gateway contract: move to another view and show the user a notice.
pub trait Navigator: Send + Sync {
    fn navigate(&self, view: View);
    fn notify(&self, message: &str);
}

/// Navigator for headless use; it only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, view: View) {
        tracing::info!(path = view.path(), "navigate");
    }

    fn notify(&self, message: &str) {
        tracing::info!(%message, "notice");
    }
}

/// resolve_view
///
/// Maps a location to a view. Whether the user is signed in is read from the token store on every
/// call and never cached.
///
/// - public pages render as themselves
/// - the login page redirects to the dashboard home when a credential is held
/// - dashboard pages require a credential, else the login view
/// - `/admin` is the dashboard home
/// - anything else falls back to `/`
pub fn resolve_view(path: &str, store: &dyn TokenStore) -> View {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    let authenticated = store.get().is_some();

    if PUBLIC_PATHS.contains(&path) {
        return View::Public(path.to_string());
    }
    if path == LOGIN_PATH {
        return if authenticated {
            View::admin_home()
        } else {
            View::Login
        };
    }

    let page = match path.strip_prefix("/admin") {
        Some("") => Some(""),
        Some(rest) => rest.strip_prefix('/'),
        None => None,
    };
    match page {
        Some(page) if page.is_empty() || ADMIN_PAGES.contains(&page) => {
            if !authenticated {
                View::Login
            } else if page.is_empty() {
                View::admin_home()
            } else {
                View::Admin(path.to_string())
            }
        }
        _ => View::Public("/".to_string()),
    }
}

/// Session
///
/// Login and logout for the dashboard. Holds no authentication flag of its own: the token store is
/// the only record of being signed in.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    client: ApiClient,
}

impl Session {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let client = ApiClient::new(base_url, store.clone(), navigator.clone());
        Self {
            store,
            navigator,
            client,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Stores the issued credential and opens the dashboard. A failed login leaves the store as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let response = self.client.login(username, password).await?;
        self.store.set(&response.token);
        tracing::info!(user = %response.username, "signed in");
        self.navigator.navigate(View::admin_home());
        Ok(response)
    }

    /// Client-side only: the credential stays valid on the server until it expires.
    pub fn logout(&self) {
        self.store.clear();
        self.navigator.navigate(View::Login);
    }

    pub fn view_for(&self, path: &str) -> View {
        resolve_view(path, self.store.as_ref())
    }
}
