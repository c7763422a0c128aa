use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError, GatewayBackend};

/// Validate configuration beyond what serde enforces.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().unwrap_or("").is_empty()
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
        ));
    }

    if config.gateway.backend == GatewayBackend::Razorpay
        && (config.gateway.key_id.is_empty() || config.gateway.key_secret.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "gateway.key_id and gateway.key_secret are required for razorpay".to_string(),
        ));
    }

    if config.ledger.claim_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "ledger.claim_ttl_secs cannot be 0".to_string(),
        ));
    }

    if config.ledger.sweep_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "ledger.sweep_interval_ms cannot be 0".to_string(),
        ));
    }

    validate_schemes(config)
}

fn validate_schemes(config: &Config) -> Result<(), ConfigError> {
    if config.schemes.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one scheme must be configured".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for scheme in &config.schemes {
        if !ids.insert(scheme.id) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate scheme id {}",
                scheme.id
            )));
        }
        if scheme.count == 0 {
            return Err(ConfigError::ValidationError(format!(
                "scheme {} has an empty ticket range",
                scheme.id
            )));
        }
        if scheme.ticket_price == 0 {
            return Err(ConfigError::ValidationError(format!(
                "scheme {} has no ticket price",
                scheme.id
            )));
        }
        if scheme.start.checked_add(scheme.count - 1).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "scheme {} range overflows",
                scheme.id
            )));
        }
    }

    // Ranges must be disjoint so a printed number identifies one scheme.
    let mut ranges: Vec<(u32, u32, u32)> = config
        .schemes
        .iter()
        .map(|s| (s.start, s.start + (s.count - 1), s.id))
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let (_, prev_end, prev_id) = pair[0];
        let (next_start, _, next_id) = pair[1];
        if next_start <= prev_end {
            return Err(ConfigError::ValidationError(format!(
                "schemes {} and {} have overlapping ticket ranges",
                prev_id, next_id
            )));
        }
    }

    Ok(())
}
