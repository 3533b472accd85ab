//! Configuration validation.
//!
//! Serde handles syntax; this checks meaning. Every problem is reported, not
//! just the first.

use std::net::SocketAddr;
use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;
use url::Url;

use crate::config::schema::MintConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration; returns every problem found.
pub fn validate_config(config: &MintConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "ledger.rpc_url", &config.ledger.rpc_url, &["http", "https"]);
    if let Some(ws) = &config.ledger.ws_url {
        check_url(&mut errors, "ledger.ws_url", ws, &["ws", "wss"]);
    }
    for url in &config.ledger.failover_urls {
        check_url(&mut errors, "ledger.failover_urls", url, &["http", "https"]);
    }
    if config.ledger.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("ledger.rpc_timeout_secs", "must be greater than 0"));
    }

    check_pubkey(&mut errors, "candy_machine.program_id", &config.candy_machine.program_id);
    // The machine id is optional until something needs it.
    if !config.candy_machine.candy_machine_id.is_empty() {
        check_pubkey(
            &mut errors,
            "candy_machine.candy_machine_id",
            &config.candy_machine.candy_machine_id,
        );
    }

    let submission = &config.submission;
    for (field, value) in [
        ("submission.confirm_timeout_ms", submission.confirm_timeout_ms),
        ("submission.resend_interval_ms", submission.resend_interval_ms),
        ("submission.poll_interval_ms", submission.poll_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if submission.resend_interval_ms >= submission.confirm_timeout_ms {
        errors.push(ValidationError::new(
            "submission.resend_interval_ms",
            "must be shorter than confirm_timeout_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str, schemes: &[&str]) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("scheme '{}' not one of {:?}", url.scheme(), schemes),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("'{}': {}", value, e))),
    }
}

fn check_pubkey(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if Pubkey::from_str(value).is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a valid public key", value),
        ));
    }
}
