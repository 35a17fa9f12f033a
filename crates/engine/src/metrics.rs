// Metrics hooks for the engine.
//
// Callers install a global `AuthMetrics` implementation via [`set_auth_metrics`];
// every `FaceAuthService` then reports enrollment and authentication latency
// and outcomes through it. No metrics backend is linked here.
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use crate::types::AuthDecision;

/// Metrics observer for enrollment and authentication.
pub trait AuthMetrics: Send + Sync {
    /// Record one enrollment attempt. `success` is false when any step,
    /// including the external commitment write, failed.
    fn record_enroll(&self, wallet: &str, latency: Duration, success: bool);

    /// Record one authentication verdict.
    fn record_authenticate(&self, wallet: &str, decision: AuthDecision, latency: Duration);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn AuthMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn AuthMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn AuthMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global auth metrics recorder.
pub fn set_auth_metrics(recorder: Option<Arc<dyn AuthMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
