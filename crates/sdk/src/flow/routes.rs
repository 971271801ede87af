//! HTTP surface of a provider login cycle

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::{CallbackParams, LoginFlow};
use crate::session::Session;

#[derive(Debug, Deserialize)]
struct StartQuery {
    redirect: Option<String>,
}

/// Login routes for one provider: `GET /`, `GET /login` and `GET /return`.
///
/// `/return` needs the session layer installed above it.
pub fn login_routes(flow: Arc<LoginFlow>) -> Router {
    Router::new()
        .route("/", get(start_login))
        .route("/login", get(start_login))
        .route("/return", get(provider_callback))
        .with_state(flow)
}

/// `302 Found`; axum's `Redirect` only offers 303/307/308
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn start_login(
    State(flow): State<Arc<LoginFlow>>,
    Query(query): Query<StartQuery>,
) -> Response {
    match flow.initiate(query.redirect.as_deref()) {
        Ok(url) => found(url.as_str()),
        Err(e) => {
            tracing::warn!(source = flow.source(), error = %e, "Cannot start login");
            (StatusCode::BAD_REQUEST, e.user_message()).into_response()
        }
    }
}

async fn provider_callback(
    State(flow): State<Arc<LoginFlow>>,
    session: Session,
    params: Option<Query<CallbackParams>>,
) -> Response {
    // Malformed callback queries still end in a failure redirect
    let params = params.map(|Query(p)| p).unwrap_or_default();
    found(&flow.complete(&params, &session).await)
}
