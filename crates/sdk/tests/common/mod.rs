//! Common test utilities
#![allow(dead_code)] // Not every test file uses every helper

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use auth_plugin_sdk::directory::MemoryDirectory;
use auth_plugin_sdk::identity::EmailGroupMapping;
use auth_plugin_sdk::session::{
    MemorySessionStore, PassthroughSerializer, SessionData, SessionError, SessionStore,
};
use auth_plugin_sdk::{
    login_routes, session_middleware, AuthError, CallbackParams, ExternalProfile, IdentityLinker,
    LoginFlow, ProviderStrategy, RedirectPolicy, Session, SessionManager,
};
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::routing::get;
use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use url::Url;

pub const EXTERNAL_URL: &str = "http://localhost:6100";
pub const DEFAULT_REDIRECT: &str = "/sign-in-redirect";
pub const GOOD_CODE: &str = "good-code";

/// Provider double: accepts `GOOD_CODE` and records the state it was given
pub struct FakeStrategy {
    profile: ExternalProfile,
    scopes: Vec<String>,
    last_state: Mutex<Option<String>>,
}

impl FakeStrategy {
    pub fn new(profile: ExternalProfile) -> Self {
        Self {
            profile,
            scopes: vec!["profile".to_string(), "email".to_string()],
            last_state: Mutex::new(None),
        }
    }

    pub fn last_state(&self) -> Option<String> {
        self.last_state.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderStrategy for FakeStrategy {
    fn source(&self) -> &str {
        "google"
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        *self.last_state.lock().unwrap() = Some(state.to_string());
        let mut url = Url::parse("https://idp.example/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);
        Ok(url)
    }

    async fn authenticate(&self, params: &CallbackParams) -> Result<ExternalProfile, AuthError> {
        match params.code.as_deref() {
            Some(GOOD_CODE) => Ok(self.profile.clone()),
            _ => Err(AuthError::Provider("invalid authorization code".to_string())),
        }
    }
}

/// Session store whose backend cannot be reached
pub struct UnreachableStore;

fn unreachable_error() -> SessionError {
    SessionError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "store unreachable",
    ))
}

#[async_trait]
impl SessionStore for UnreachableStore {
    async fn load(&self, _id: &str) -> Result<Option<SessionData>, SessionError> {
        Err(unreachable_error())
    }

    async fn save(
        &self,
        _id: &str,
        _data: &SessionData,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        Err(unreachable_error())
    }

    async fn touch(&self, _id: &str, _expires_at: DateTime<Utc>) -> Result<(), SessionError> {
        Err(unreachable_error())
    }

    async fn destroy(&self, _id: &str) -> Result<(), SessionError> {
        Err(unreachable_error())
    }
}

pub fn profile(id: &str, emails: &[&str]) -> ExternalProfile {
    ExternalProfile {
        id: id.to_string(),
        display_name: "A".to_string(),
        emails: emails.iter().map(|e| (*e).to_string()).collect(),
        ..Default::default()
    }
}

/// Everything a login test needs to poke at
pub struct TestHarness {
    pub app: Router,
    pub directory: Arc<MemoryDirectory>,
    pub strategy: Arc<FakeStrategy>,
    pub sessions: Arc<MemorySessionStore>,
}

pub struct HarnessBuilder {
    profile: ExternalProfile,
    directory: Arc<MemoryDirectory>,
    allowed_hosts: Vec<String>,
    configure: Box<dyn FnOnce(IdentityLinker) -> IdentityLinker>,
    groups: Option<EmailGroupMapping>,
    session_store: Option<Arc<dyn SessionStore>>,
}

impl HarnessBuilder {
    pub fn new(profile: ExternalProfile) -> Self {
        Self {
            profile,
            directory: Arc::new(MemoryDirectory::new()),
            allowed_hosts: Vec::new(),
            configure: Box::new(|linker| linker),
            groups: None,
            session_store: None,
        }
    }

    pub fn directory(mut self, directory: MemoryDirectory) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    pub fn allowed_hosts(mut self, hosts: &[&str]) -> Self {
        self.allowed_hosts = hosts.iter().map(|h| (*h).to_string()).collect();
        self
    }

    pub fn linker(mut self, configure: impl FnOnce(IdentityLinker) -> IdentityLinker + 'static) -> Self {
        self.configure = Box::new(configure);
        self
    }

    pub fn groups(mut self, mapping: EmailGroupMapping) -> Self {
        self.groups = Some(mapping);
        self
    }

    /// Back the session layer with `store` instead of `TestHarness::sessions`
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn build(self) -> TestHarness {
        let strategy = Arc::new(FakeStrategy::new(self.profile));
        let linker = (self.configure)(IdentityLinker::new(self.directory.clone()));
        let policy = RedirectPolicy::new(EXTERNAL_URL, DEFAULT_REDIRECT, &self.allowed_hosts).unwrap();
        let mut flow = LoginFlow::new(strategy.clone(), linker, policy);
        if let Some(groups) = self.groups {
            flow = flow.with_session_extension(Arc::new(groups));
        }

        let sessions = Arc::new(MemorySessionStore::new());
        let store = self
            .session_store
            .unwrap_or_else(|| sessions.clone() as Arc<dyn SessionStore>);
        let manager = SessionManager::new(
            "test-session-secret",
            Default::default(),
            store,
            Arc::new(PassthroughSerializer),
        )
        .unwrap();

        let app = login_routes(Arc::new(flow))
            .route(
                "/whoami",
                get(|session: Session| async move {
                    axum::Json(session.principal())
                }),
            )
            .layer(middleware::from_fn_with_state(manager, session_middleware));

        TestHarness {
            app,
            directory: self.directory,
            strategy,
            sessions,
        }
    }
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn location<B>(response: &Response<B>) -> Url {
    let value = response
        .headers()
        .get(header::LOCATION)
        .expect("redirect has a Location header")
        .to_str()
        .unwrap();
    Url::parse(value).unwrap()
}

pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `name=value` of the session cookie, if one was set
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("connect.sid="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn callback_uri(code: &str, state: &str) -> String {
    let mut url = Url::parse("http://plugin.local/return").unwrap();
    url.query_pairs_mut()
        .append_pair("code", code)
        .append_pair("state", state);
    format!("/return?{}", url.query().unwrap_or_default())
}
