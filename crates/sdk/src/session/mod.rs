//! Server-side session transport
//!
//! A request-pipeline stage that loads the session named by the signed
//! session cookie, exposes it to handlers as a `Session`, and persists it on
//! the way out. Sessions are only written once something is stored in them;
//! every request that carries a live session extends its expiry. Handlers
//! that must know the write succeeded call `Session::persist` themselves.
//!
//! This layer does not interpret session contents beyond the principal slot
//! read and written through a `PrincipalSerializer`.

mod signing;
mod store;

pub use signing::{generate_session_id, sign, unsign};
pub use store::{MemorySessionStore, SessionData, SessionStore, SqliteSessionStore};

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::Principal;

/// Session cookie name shared by every component of the gateway
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "connect.sid";

/// Session key holding the authenticated principal (`{"user": ...}`)
const PRINCIPAL_SLOT: &str = "passport";
const PRINCIPAL_KEY: &str = "user";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session secret is not configured")]
    MissingSecret,

    #[error("session store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("session data is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("session store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session cookie attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieOptions {
    /// Cookie and record lifetime in seconds (default: 7 hours)
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    #[serde(default = "default_true")]
    pub http_only: bool,

    /// Secure cookie (HTTPS only)
    #[serde(default)]
    pub secure: bool,

    /// SameSite policy: Strict, Lax or None
    #[serde(default = "default_same_site")]
    pub same_site: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub domain: Option<String>,
}

const fn default_max_age() -> u64 {
    7 * 60 * 60
}

const fn default_true() -> bool {
    true
}

fn default_same_site() -> String {
    "Lax".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age(),
            http_only: true,
            secure: false,
            same_site: default_same_site(),
            path: default_path(),
            domain: None,
        }
    }
}

impl CookieOptions {
    fn same_site(&self) -> SameSite {
        match self.same_site.to_ascii_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        }
    }

    fn max_age_secs_i64(&self) -> i64 {
        i64::try_from(self.max_age_secs).unwrap_or(i64::from(u32::MAX))
    }
}

/// Converts principals to and from their stored form
pub trait PrincipalSerializer: Send + Sync {
    fn serialize(&self, principal: &Principal) -> Result<Value, SessionError>;
    fn deserialize(&self, value: Value) -> Result<Principal, SessionError>;
}

/// Stores the principal unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSerializer;

impl PrincipalSerializer for PassthroughSerializer {
    fn serialize(&self, principal: &Principal) -> Result<Value, SessionError> {
        Ok(serde_json::to_value(principal)?)
    }

    fn deserialize(&self, value: Value) -> Result<Principal, SessionError> {
        Ok(serde_json::from_value(value)?)
    }
}

struct SessionState {
    id: String,
    data: SessionData,
    /// Not yet in the store
    is_new: bool,
    modified: bool,
    /// Record to drop after the id was regenerated
    replaced_id: Option<String>,
    /// Written by `persist` during this request
    saved: bool,
    /// Neither written nor sent back
    discarded: bool,
}

/// Per-request handle to the current session
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    manager: SessionManager,
}

impl Session {
    fn new(id: String, data: SessionData, is_new: bool, manager: SessionManager) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                id,
                data,
                is_new,
                modified: false,
                replaced_id: None,
                saved: false,
                discarded: false,
            })),
            manager,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn is_new(&self) -> bool {
        self.lock().is_new
    }

    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock().data.get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let mut state = self.lock();
        state.data.insert(key.to_string(), value);
        state.modified = true;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        let removed = state.data.remove(key);
        if removed.is_some() {
            state.modified = true;
        }
        removed
    }

    /// Move the contents to a fresh id; the old record is dropped once persisted
    pub fn regenerate(&self) {
        let mut state = self.lock();
        let old_id = std::mem::replace(&mut state.id, generate_session_id());
        if !state.is_new && state.replaced_id.is_none() {
            state.replaced_id = Some(old_id);
        }
        state.is_new = true;
        state.modified = true;
    }

    /// Write the session to the store now instead of on the way out.
    ///
    /// On error nothing is marked saved and the record keeps its previous
    /// state in the store.
    pub async fn persist(&self) -> Result<(), SessionError> {
        let (id, data, replaced_id) = {
            let state = self.lock();
            (state.id.clone(), state.data.clone(), state.replaced_id.clone())
        };

        let store = &self.manager.inner.store;
        store.save(&id, &data, self.manager.expiry()).await?;
        if let Some(old_id) = &replaced_id {
            store.destroy(old_id).await?;
        }

        let mut state = self.lock();
        state.is_new = false;
        state.modified = false;
        state.replaced_id = None;
        state.saved = true;
        Ok(())
    }

    /// Drop pending changes; the response carries no session cookie
    pub fn discard(&self) {
        self.lock().discarded = true;
    }

    /// Store the principal under a regenerated session id
    pub fn login(&self, principal: &Principal) -> Result<(), SessionError> {
        let stored = self.manager.inner.serializer.serialize(principal)?;
        self.regenerate();
        let mut slot = serde_json::Map::new();
        slot.insert(PRINCIPAL_KEY.to_string(), stored);
        self.insert(PRINCIPAL_SLOT, &slot)
    }

    /// Principal of the authenticated user, if any
    pub fn principal(&self) -> Option<Principal> {
        let stored = self
            .lock()
            .data
            .get(PRINCIPAL_SLOT)
            .and_then(|slot| slot.get(PRINCIPAL_KEY))
            .cloned()?;
        self.manager.inner.serializer.deserialize(stored).ok()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session layer not installed"))
    }
}

struct ManagerInner {
    secret: String,
    cookie: CookieOptions,
    store: Arc<dyn SessionStore>,
    serializer: Arc<dyn PrincipalSerializer>,
}

/// Shared state of the session pipeline stage
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Fails when the secret is empty
    pub fn new(
        secret: impl Into<String>,
        cookie: CookieOptions,
        store: Arc<dyn SessionStore>,
        serializer: Arc<dyn PrincipalSerializer>,
    ) -> Result<Self, SessionError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }
        Ok(Self {
            inner: Arc::new(ManagerInner {
                secret,
                cookie,
                store,
                serializer,
            }),
        })
    }

    pub fn cookie_options(&self) -> &CookieOptions {
        &self.inner.cookie
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.inner.cookie.max_age_secs_i64())
    }

    /// Verified session id from the request cookies
    fn session_id_from(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == DEFAULT_SESSION_COOKIE_NAME)
            .and_then(|cookie| unsign(cookie.value(), &self.inner.secret))
    }

    fn fresh_session(&self) -> Session {
        Session::new(generate_session_id(), SessionData::new(), true, self.clone())
    }

    async fn load(&self, headers: &HeaderMap) -> Session {
        let Some(id) = self.session_id_from(headers) else {
            return self.fresh_session();
        };

        match self.inner.store.load(&id).await {
            Ok(Some(data)) => Session::new(id, data, false, self.clone()),
            Ok(None) => self.fresh_session(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load session");
                self.fresh_session()
            }
        }
    }

    fn session_cookie(&self, id: &str) -> Cookie<'static> {
        let options = &self.inner.cookie;
        let max_age = cookie::time::Duration::seconds(options.max_age_secs_i64());
        let mut builder = Cookie::build((DEFAULT_SESSION_COOKIE_NAME, sign(id, &self.inner.secret)))
            .path(options.path.clone())
            .http_only(options.http_only)
            .secure(options.secure)
            .same_site(options.same_site())
            .max_age(max_age)
            .expires(cookie::time::OffsetDateTime::now_utc() + max_age);
        if let Some(domain) = &options.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    /// Persist the session if needed and (re)issue the cookie
    async fn commit(&self, session: &Session, response: &mut Response) {
        let (id, is_new, modified, saved, discarded) = {
            let state = session.lock();
            (
                state.id.clone(),
                state.is_new,
                state.modified,
                state.saved,
                state.discarded,
            )
        };

        if discarded || (is_new && !modified) {
            return;
        }

        let persisted = if modified {
            session.persist().await
        } else if saved {
            Ok(())
        } else {
            self.inner.store.touch(&id, self.expiry()).await
        };

        if let Err(e) = persisted {
            tracing::error!(error = %e, "Failed to persist session");
            return;
        }

        let cookie = self.session_cookie(&id).encoded().to_string();
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Session cookie is not a valid header"),
        }
    }
}

/// Axum middleware; install with `middleware::from_fn_with_state`
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = manager.load(request.headers()).await;
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;
    manager.commit(&session, &mut response).await;
    response
}
