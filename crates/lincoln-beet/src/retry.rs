// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! Retry policies with URL-based classification for the platform client.
//!
//! Requests are split into two scopes:
//!
//! - **Api**: JSON method calls below `/public/api/` (project, dataset and
//!   annotation methods). Authentication failures fail fast.
//! - **Transfer**: image uploads, team file downloads and anything outside
//!   the API prefix. These move large payloads and retry every transient
//!   failure, including 409 and 423.
//!
//! # Configuration
//!
//! - `LINCOLN_BEET_MAX_RETRIES`: maximum retry attempts per request
//!   (default: 3)
//! - `LINCOLN_BEET_TIMEOUT`: request timeout in seconds (default: 30)
//!
//! ```rust
//! use lincoln_beet::{RetryScope, classify_url};
//!
//! assert_eq!(
//!     classify_url("https://app.example.com/public/api/v3/projects.add"),
//!     RetryScope::Api
//! );
//! assert_eq!(
//!     classify_url("https://app.example.com/public/api/v3/images.upload"),
//!     RetryScope::Transfer
//! );
//! ```

use std::time::Duration;
use url::Url;

const API_PREFIX: &str = "/public/api/";
const TRANSFER_METHODS: [&str; 2] = ["images.upload", "file-storage.download"];

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Retry scope of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// Platform API method call.
    Api,
    /// Bulk payload transfer (image upload, team file download).
    Transfer,
}

/// Classifies a request URL into a [`RetryScope`].
///
/// Only http(s) URLs whose path lies below `/public/api/` are API calls, and
/// of those the upload and download methods count as transfers. Everything
/// else, including unparsable URLs, is a transfer.
pub fn classify_url(url: &str) -> RetryScope {
    let Ok(parsed) = Url::parse(url) else {
        return RetryScope::Transfer;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return RetryScope::Transfer;
    }

    let path = parsed.path();
    if !path.starts_with(API_PREFIX) {
        return RetryScope::Transfer;
    }

    let method = path.rsplit('/').next().unwrap_or_default();
    if TRANSFER_METHODS.contains(&method) {
        RetryScope::Transfer
    } else {
        RetryScope::Api
    }
}

/// Maximum retries per request from `LINCOLN_BEET_MAX_RETRIES`.
pub fn max_retries() -> u32 {
    std::env::var("LINCOLN_BEET_MAX_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Request timeout from `LINCOLN_BEET_TIMEOUT`.
pub fn timeout() -> Duration {
    let secs = std::env::var("LINCOLN_BEET_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

impl RetryScope {
    /// Whether a response with `status` is retried in this scope.
    ///
    /// Both scopes retry 408, 429 and 5xx. Transfers also retry 409 and 423
    /// (object locked by a concurrent write). Everything else, 401 and 403
    /// included, is final.
    pub fn retries_status(&self, status: u16) -> bool {
        match (self, status) {
            (_, 408 | 429 | 500..=599) => true,
            (RetryScope::Transfer, 409 | 423) => true,
            _ => false,
        }
    }
}

/// Builds the reqwest retry policy used by [`crate::Client`].
///
/// Transport errors without a response are retried in both scopes. Both
/// scopes share the same retry count; see [`RetryScope::retries_status`] for
/// the status rules.
pub fn create_retry_policy() -> reqwest::retry::Builder {
    reqwest::retry::for_host("*")
        .max_retries_per_request(max_retries())
        .classify_fn(|req_rep| {
            let scope = classify_url(&req_rep.uri().to_string());
            match req_rep.status() {
                Some(status) if scope.retries_status(status.as_u16()) => req_rep.retryable(),
                Some(_) => req_rep.success(),
                None if req_rep.error().is_some() => req_rep.retryable(),
                None => req_rep.success(),
            }
        })
}

pub fn log_retry_configuration() {
    log::debug!(
        "Retry configuration - max_retries={}, timeout={}s",
        max_retries(),
        timeout().as_secs()
    );
}
