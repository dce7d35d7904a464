//! Immutable per-upstream configuration, set once at registration.

use std::time::Duration;

use hatago_transport::TransportSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPolicy {
    /// Activate immediately at hub startup and keep running.
    Always,
    /// Activate lazily on first call, then subject to the idle policy.
    OnDemand,
    /// Only activate in response to an explicit operator/admin action.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityReset {
    OnCallStart,
    OnCallEnd,
}

#[derive(Debug, Clone, Copy)]
pub struct IdlePolicy {
    pub idle_timeout: Duration,
    pub min_linger: Duration,
    pub activity_reset: ActivityReset,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            min_linger: Duration::from_secs(30),
            activity_reset: ActivityReset::OnCallEnd,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub id: String,
    pub transport: TransportSpec,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub keep_alive: Duration,
    pub activation_policy: ActivationPolicy,
    pub idle_policy: IdlePolicy,
    pub max_restarts: u32,
    pub tags: Vec<String>,
}
