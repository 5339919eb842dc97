// Building Catalog - Web Server
// REST API with Axum over the moderation workflow

use anyhow::{Context, Result};
use building_catalog::api::{router, AppState};
use building_catalog::config::{init_tracing, Args};
use building_catalog::{open_catalog, RecaptchaVerifier, SystemClock, VerificationGate};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Open database
    let conn = open_catalog(&args.store.db_path)?;
    info!(path = ?args.store.db_path, "Catalog opened");

    // Verification gate
    let verification = &args.verification;
    let verifier = RecaptchaVerifier::new(
        verification.recaptcha_secret.clone().unwrap_or_default(),
        verification.recaptcha_verify_url.clone(),
        verification.verify_timeout(),
    )
    .context("Failed to build verification client")?;
    let gate = VerificationGate::new(
        verification.gate_config(),
        Arc::new(SystemClock),
        Arc::new(verifier),
    );

    // Build router
    let app = router(AppState::new(conn, gate));

    // Start server
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", args.listen))?;

    info!(listen = %args.listen, "🚀 Server running");
    info!("   API: http://{}/api/buildings/all/name/asc", args.listen);

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
