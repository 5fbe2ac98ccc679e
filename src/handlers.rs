// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers and router for the temp-mail service.
//!
//! Create handlers sit behind [`admission_layer`]; by the time they run the
//! request has already been admitted and counted.

use crate::admission::AdmissionControl;
use crate::auth::{require_auth, Authenticator, StaticTokenAuthenticator};
use crate::captcha::CaptchaVerifier;
use crate::config::Config;
use crate::emails::{NewTempEmail, TempEmail, TempEmailStore};
use crate::error::AppError;
use crate::identity::AuthenticatedUser;
use crate::metrics::{self, AdmissionMetrics};
use crate::middleware::admission_layer;
use crate::policy::PolicyConfig;
use crate::store::CounterStore;
use axum::{
    extract::State,
    http::header,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub admission: Arc<AdmissionControl>,
    pub authenticator: Arc<dyn Authenticator>,
    pub emails: Arc<dyn TempEmailStore>,
    pub registry: Registry,
}

impl AppState {
    /// Wire the admission stack from `config`.
    ///
    /// `verifier` is ignored unless the config carries a site key.
    pub fn new(
        config: Config,
        verifier: Option<Arc<dyn CaptchaVerifier>>,
        emails: Arc<dyn TempEmailStore>,
    ) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let metrics = AdmissionMetrics::new(&registry)?;

        let store = CounterStore::new(
            config.admission.window_duration(),
            config.admission.max_identities,
        );
        let policy = PolicyConfig::new(
            &config.admission,
            config.captcha.enabled_site_key().map(str::to_string),
        );
        let admission = Arc::new(AdmissionControl::new(store, policy, verifier, metrics));
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(StaticTokenAuthenticator::new(config.auth.tokens.clone()));

        Ok(Self {
            config,
            admission,
            authenticator,
            emails,
            registry,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Body of both create endpoints.
///
/// `captchaResponse` is consumed by the admission layer; handlers ignore it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateEmailRequest {
    pub email: String,
    pub domain_id: String,
    pub captcha_response: Option<String>,
}

impl CreateEmailRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() {
            return Err(AppError::Validation("email must not be empty".into()));
        }
        if self.domain_id.trim().is_empty() {
            return Err(AppError::Validation("domainId must not be empty".into()));
        }
        Ok(())
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "tempmail-admission",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create an address owned by the signed-in user.
pub async fn create_email(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateEmailRequest>,
) -> Result<Json<TempEmail>, AppError> {
    req.validate()?;
    let ttl = state
        .config
        .emails
        .authenticated_ttl()
        .ok_or_else(|| anyhow::anyhow!("authenticated_ttl_hours out of range"))?;
    let created = state
        .emails
        .create_temp_email(NewTempEmail {
            user_id: Some(user.0),
            email: req.email,
            domain_id: req.domain_id,
            ttl,
        })
        .await?;

    info!(id = %created.id, user = ?created.user_id, "Created temporary email");
    Ok(Json(created))
}

/// Create an anonymous address.
pub async fn create_public_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEmailRequest>,
) -> Result<Json<TempEmail>, AppError> {
    req.validate()?;
    let ttl = state
        .config
        .emails
        .public_ttl()
        .ok_or_else(|| anyhow::anyhow!("public_ttl_hours out of range"))?;
    let created = state
        .emails
        .create_temp_email(NewTempEmail {
            user_id: None,
            email: req.email,
            domain_id: req.domain_id,
            ttl,
        })
        .await?;

    info!(id = %created.id, "Created public temporary email");
    Ok(Json(created))
}

/// Prometheus scrape endpoint.
pub async fn scrape_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let body = metrics::render(&state.registry).map_err(anyhow::Error::from)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Build the service router.
///
/// On the signed-in route authentication runs first so admission can key
/// on the user id.
pub fn router(state: Arc<AppState>) -> Router {
    let admission = from_fn_with_state(Arc::clone(&state.admission), admission_layer);

    let authenticated: Router<Arc<AppState>> = Router::new()
        .route("/api/emails/create", post(create_email))
        .route_layer(admission.clone())
        .route_layer(from_fn_with_state(
            Arc::clone(&state.authenticator),
            require_auth,
        ));

    let public: Router<Arc<AppState>> = Router::new()
        .route("/api/emails/public/create", post(create_public_email))
        .route_layer(admission);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .merge(authenticated)
        .merge(public);

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(scrape_metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}
