/// Metrics and telemetry for the Skytrade core
///
/// Prometheus-compatible counters for the three state machines:
/// authentication outcomes, lockouts, and token lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Login attempts by outcome:
    /// success | invalid_credentials | locked | email_not_verified
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "login_attempts_total",
        "Total number of login attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Accounts transitioned to locked
    pub static ref LOCKOUTS_TOTAL: IntCounter = register_int_counter!(
        "lockouts_total",
        "Total number of account lockout transitions"
    )
    .unwrap();

    /// Tokens issued by kind (reset | verify)
    pub static ref TOKENS_ISSUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tokens_issued_total",
        "Total number of tokens issued",
        &["kind"]
    )
    .unwrap();

    /// Tokens successfully consumed by kind
    pub static ref TOKENS_CONSUMED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tokens_consumed_total",
        "Total number of tokens consumed",
        &["kind"]
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_register_and_render() {
        LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
        LOCKOUTS_TOTAL.inc();
        TOKENS_ISSUED_TOTAL.with_label_values(&["reset"]).inc();

        let output = render();
        assert!(output.contains("login_attempts_total"));
        assert!(output.contains("lockouts_total"));
    }
}
