// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup; provider clients read their own variables at construction.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the embedded database | `data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `STRIPE_WEBHOOK_SECRET` | Shared secret for webhook signature verification | Required for webhook ingest |
//! | `STRIPE_SECRET_KEY` | Stripe API key used by the refund endpoint | Required for refunds |
//! | `STRIPE_API_BASE_URL` | Stripe API base URL | `https://api.stripe.com` |
//! | `WALLET_PROVIDER_API_KEY` | Wallet provider API key | Required for payouts |
//! | `WALLET_PROVIDER_BASE_URL` | Wallet provider API base URL | `https://api.circle.com` |
//! | `PAYOUT_CURRENCY` | Token symbol sent to the wallet provider | `USDC` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable name for the database directory path.
///
/// The embedded redb database file lives under this directory. All payment,
/// product and seller-wallet records are stored here.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default database directory when `DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Environment variable name for the webhook shared secret.
pub const STRIPE_WEBHOOK_SECRET_ENV: &str = "STRIPE_WEBHOOK_SECRET";
