// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paylink_server::{
    api::router,
    config::{DATA_DIR_ENV, DEFAULT_DATA_DIR, STRIPE_WEBHOOK_SECRET_ENV},
    providers::{circle::CircleClient, stripe::StripeClient},
    state::AppState,
    storage::PaymentDatabase,
};

const DB_FILE_NAME: &str = "paylink.redb";

#[tokio::main]
async fn main() {
    init_tracing();

    let data_dir: PathBuf = env::var(DATA_DIR_ENV)
        .unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string())
        .into();
    let db = PaymentDatabase::open(&data_dir.join(DB_FILE_NAME))
        .expect("Failed to open payment database");

    let mut state = AppState::new(db);

    state.webhook_secret = env::var(STRIPE_WEBHOOK_SECRET_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if state.webhook_secret.is_none() {
        warn!("STRIPE_WEBHOOK_SECRET not set; webhook ingest disabled");
    }

    if StripeClient::is_configured() {
        match StripeClient::from_env() {
            Ok(client) => state.stripe = Some(Arc::new(client)),
            Err(error) => warn!(error = %error, "failed to build Stripe client; refunds disabled"),
        }
    } else {
        warn!("STRIPE_SECRET_KEY not set; refunds disabled");
    }

    if CircleClient::is_configured() {
        match CircleClient::from_env() {
            Ok(client) => state.payouts = Some(Arc::new(client)),
            Err(error) => {
                warn!(error = %error, "failed to build wallet provider client; payouts disabled");
            }
        }
    } else {
        warn!("WALLET_PROVIDER_API_KEY not set; payouts require manual initiation once configured");
    }

    let app = router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    info!("Paylink server listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
