//! HTTP surface of the Google plugin
//!
//! `/healthz`, `/icon.svg` and `/config` are always served. The login routes
//! (`/`, `/login`, `/return`) sit behind the session layer and are only
//! mounted when the Google client is fully configured.

use std::sync::Arc;

use auth_plugin_sdk::directory::DirectoryClient;
use auth_plugin_sdk::hooks::{AssignOrgUnit, AssignRoles};
use auth_plugin_sdk::identity::EmailGroupMapping;
use auth_plugin_sdk::plugin::AuthPluginConfig;
use auth_plugin_sdk::session::{PassthroughSerializer, SessionStore};
use auth_plugin_sdk::{
    login_routes, session_middleware, IdentityLinker, LoginFlow, ProviderStrategy,
    RedirectPolicy, SessionManager,
};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use tower_http::trace::TraceLayer;

use crate::config::PluginConfig;
use crate::strategy::GoogleStrategy;

/// 36x36 logo shown on the front-end login page
const ICON_SVG: &[u8] = include_bytes!("../assets/google-logo.svg");

/// Everything the router needs from outside
pub struct AppDeps {
    pub directory: Arc<dyn DirectoryClient>,
    pub sessions: Arc<dyn SessionStore>,
    /// Provider override; `None` builds Google from the config
    pub strategy: Option<Arc<dyn ProviderStrategy>>,
}

/// Build the plugin router.
///
/// Fails on settings the plugin cannot serve without (session secret,
/// redirect base). A missing Google client only disables login.
pub fn build_app(config: &PluginConfig, deps: AppDeps) -> anyhow::Result<Router> {
    let metadata = Arc::new(config.plugin_metadata());

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/icon.svg", get(icon))
        .route("/config", get(plugin_config))
        .with_state(metadata);

    let strategy = match deps.strategy {
        Some(strategy) => Some(strategy),
        None => match GoogleStrategy::new(&config.google, &config.external_url) {
            Ok(strategy) => Some(Arc::new(strategy) as Arc<dyn ProviderStrategy>),
            Err(e) => {
                tracing::warn!(error = %e, "Google login disabled");
                None
            }
        },
    };

    if let Some(strategy) = strategy {
        let manager = SessionManager::new(
            config.session.secret.clone().unwrap_or_default(),
            config.session.cookie.clone(),
            deps.sessions,
            Arc::new(PassthroughSerializer),
        )?;
        let flow = login_flow(config, strategy, deps.directory)?;
        app = app.merge(
            login_routes(Arc::new(flow))
                .layer(middleware::from_fn_with_state(manager, session_middleware)),
        );
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}

fn login_flow(
    config: &PluginConfig,
    strategy: Arc<dyn ProviderStrategy>,
    directory: Arc<dyn DirectoryClient>,
) -> anyhow::Result<LoginFlow> {
    let mut linker = IdentityLinker::new(directory);
    if let Some(org_unit_id) = &config.hooks.org_unit_id {
        linker = linker.with_pre_create_hook(Arc::new(AssignOrgUnit::new(org_unit_id.clone())));
    }
    if !config.hooks.default_role_ids.is_empty() {
        linker = linker.with_post_create_hook(Arc::new(AssignRoles::new(
            config.hooks.default_role_ids.clone(),
        )));
    }

    let policy = RedirectPolicy::new(
        &config.external_url,
        &config.auth_plugin_redirect_url,
        &config.allowed_external_redirect_domains,
    )?;

    let mut flow = LoginFlow::new(strategy, linker, policy);
    let groups = EmailGroupMapping::new(config.group_mapping.clone());
    if !groups.is_empty() {
        flow = flow.with_session_extension(Arc::new(groups));
    }
    Ok(flow)
}

async fn healthz() -> &'static str {
    "OK"
}

async fn icon() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/svg+xml")], ICON_SVG)
}

async fn plugin_config(State(metadata): State<Arc<AuthPluginConfig>>) -> Json<AuthPluginConfig> {
    Json(metadata.as_ref().clone())
}
