//! Fixed-window admission control.
//!
//! Each (policy, scope key) pair owns one counter. A request opens a new
//! window when none is live; otherwise it increments the counter and is
//! denied once the post-increment count exceeds the policy limit. Denial is
//! an ordinary outcome carrying a retry hint, never an error.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::clock::{Clock, MonotonicClock};
use super::policy::{PolicySpec, PolicyTable, RatePolicy};
use super::window_store::{InMemoryWindowStore, WindowKey, WindowStore, WindowStoreError};

#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Unknown rate policy: {0}")]
    UnknownPolicy(String),

    #[error("Invalid rate policy: {0}")]
    InvalidPolicy(String),

    #[error(transparent)]
    Store(#[from] WindowStoreError),
}

/// Outcome of one admission check. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_ms: u64,
    /// The policy was skipped for this deployment
    #[serde(skip)]
    pub bypassed: bool,
    /// Counting waits for the handler outcome ([`AdmissionController::settle`])
    #[serde(skip)]
    pub deferred: bool,
}

impl RateDecision {
    fn bypass(spec: &PolicySpec) -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
            limit: spec.limit,
            remaining: spec.limit,
            reset_after_ms: 0,
            bypassed: true,
            deferred: false,
        }
    }
}

/// Deployment-level admission settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// When false, bypassable policies are skipped entirely
    pub enforced: bool,
    pub table: PolicyTable,
}

pub struct AdmissionController {
    config: AdmissionConfig,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        info!(
            "Admission controller ready (enforced={})",
            config.enforced
        );
        Self {
            config,
            store,
            clock,
        }
    }

    /// Single-process controller with an in-memory store and monotonic clock.
    pub fn in_memory(config: AdmissionConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryWindowStore::new()),
            Arc::new(MonotonicClock::new()),
        )
    }

    pub fn is_enforced(&self) -> bool {
        self.config.enforced
    }

    pub fn spec(&self, policy: RatePolicy) -> PolicySpec {
        self.config.table.get(policy)
    }

    pub async fn check(
        &self,
        policy: RatePolicy,
        scope_key: &str,
    ) -> Result<RateDecision, AdmissionError> {
        let spec = self.spec(policy);
        if spec.bypassable && !self.config.enforced {
            return Ok(RateDecision::bypass(&spec));
        }

        let key = WindowKey::new(policy, scope_key);
        let now = self.clock.now_ms();

        if spec.skip_successful {
            let live = self.store.peek(&key, spec.window_ms, now).await?;
            let used = live.map(|w| w.count).unwrap_or(0);
            if used < spec.limit {
                return Ok(RateDecision {
                    allowed: true,
                    retry_after_ms: None,
                    limit: spec.limit,
                    remaining: spec.limit - used,
                    reset_after_ms: live
                        .map(|w| w.reset_after_ms(spec.window_ms, now))
                        .unwrap_or(spec.window_ms),
                    bypassed: false,
                    deferred: true,
                });
            }
            // Window already full; the denial itself counts.
        }

        let window = self.store.hit(&key, spec.window_ms, now).await?;
        let reset_after_ms = window.reset_after_ms(spec.window_ms, now);
        let allowed = window.count <= spec.limit;

        if !allowed {
            debug!(
                "Denied {} for {}: {} > {}",
                policy, scope_key, window.count, spec.limit
            );
        }

        Ok(RateDecision {
            allowed,
            retry_after_ms: (!allowed).then_some(reset_after_ms),
            limit: spec.limit,
            remaining: spec.limit.saturating_sub(window.count),
            reset_after_ms,
            bypassed: false,
            deferred: false,
        })
    }

    /// Second half of a deferred check: only unsuccessful requests are
    /// counted against the window.
    pub async fn settle(
        &self,
        policy: RatePolicy,
        scope_key: &str,
        decision: &RateDecision,
        succeeded: bool,
    ) -> Result<(), AdmissionError> {
        if !decision.deferred || succeeded {
            return Ok(());
        }
        let spec = self.spec(policy);
        let key = WindowKey::new(policy, scope_key);
        self.store
            .hit(&key, spec.window_ms, self.clock.now_ms())
            .await?;
        Ok(())
    }

    pub async fn sweep_expired(&self) -> Result<usize, AdmissionError> {
        Ok(self.store.sweep(self.clock.now_ms()).await?)
    }
}
