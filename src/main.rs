// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Temp-mail Admission Service
//!
//! Serves the temp-email create endpoints behind per-identity admission
//! control with CAPTCHA escalation.
//!
//! ## Configuration
//!
//! Configuration is loaded from `.env` and environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `CAPTCHA_THRESHOLD`: Creations per window before a CAPTCHA (default: 5)
//! - `HARD_LIMIT`: Creations per window when CAPTCHA is off (default: 5)
//! - `WINDOW_SECS`: Counting window in seconds (default: 3600)
//! - `CAPTCHA_SECRET` / `CAPTCHA_SITE_KEY`: reCAPTCHA credentials; both or neither
//! - `AUTH_TOKENS`: `token:user` pairs for the signed-in endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tempmail_admission::{
    captcha::{CaptchaVerifier, HttpCaptchaVerifier},
    config::load_config,
    emails::InMemoryTempEmailStore,
    handlers::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = load_config();
    config.validate()?;
    info!(
        bind_addr = %config.bind_addr,
        captcha_threshold = config.admission.captcha_threshold,
        hard_limit = config.admission.hard_limit,
        window_secs = config.admission.window_secs,
        captcha_enabled = config.captcha.enabled_site_key().is_some(),
        "Starting temp-mail admission service"
    );

    let verifier: Option<Arc<dyn CaptchaVerifier>> = match config.captcha.enabled_site_key() {
        Some(_) => {
            let verifier: Arc<dyn CaptchaVerifier> =
                Arc::new(HttpCaptchaVerifier::from_config(&config.captcha)?);
            Some(verifier)
        }
        None => {
            warn!("CAPTCHA not configured; identities over the limit will be rejected");
            None
        }
    };

    let sweep_interval = config.admission.sweep_interval();
    let state = Arc::new(AppState::new(
        config.clone(),
        verifier,
        Arc::new(InMemoryTempEmailStore::new()),
    )?);

    // Drop records whose window has passed
    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = sweep_state.admission.sweep();
            if removed > 0 {
                info!(removed, "Swept expired admission records");
            }
        }
    });

    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
