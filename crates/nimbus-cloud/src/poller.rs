//! Bounded polling for asynchronously provisioned backend objects
//!
//! Every backend object moves through `pending → active | error`. The
//! poller drives that state machine from the outside: fetch, classify,
//! sleep, and give up after a fixed number of attempts.

use crate::error::{CloudError, Result};
use crate::ledger::ResourceKind;
use crate::status::ProvisioningStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between two fetches (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum number of fetches
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    240
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time one wait can take, fetch latency excluded
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

/// Polling settings used by the provisioners
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSettings {
    /// Waiting for objects to become active
    #[serde(default)]
    pub poll: PollConfig,
    /// Waiting for objects to disappear
    #[serde(default)]
    pub delete_poll: PollConfig,
}

/// What is being waited on, for logs and timeout errors
#[derive(Debug, Clone)]
pub struct PollTarget {
    pub kind: ResourceKind,
    pub id: String,
    pub goal: &'static str,
}

impl PollTarget {
    pub fn active(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            goal: "ACTIVE",
        }
    }

    pub fn deleted(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            goal: "DELETED",
        }
    }
}

/// Objects that report a provisioning status
pub trait HasStatus {
    fn provisioning_status(&self) -> ProvisioningStatus;
}

/// Poll `fetch` until `is_ready` holds.
///
/// Returns immediately with [`CloudError::TerminalState`] when
/// `is_terminal_failure` holds, and with [`CloudError::Timeout`] after
/// `max_attempts` fetches. A fetch error is treated as transient: it is
/// logged and counts as one attempt.
pub async fn wait_until<S, F, Fut, R, T>(
    target: &PollTarget,
    config: &PollConfig,
    mut fetch: F,
    is_ready: R,
    is_terminal_failure: T,
) -> Result<S>
where
    S: fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
    R: Fn(&S) -> bool,
    T: Fn(&S) -> bool,
{
    let attempts = config.max_attempts.max(1);

    for attempt in 1..=attempts {
        match fetch().await {
            Ok(state) if is_ready(&state) => {
                tracing::debug!(
                    "{} {} is {} after {} attempt(s)",
                    target.kind,
                    target.id,
                    target.goal,
                    attempt
                );
                return Ok(state);
            }
            Ok(state) if is_terminal_failure(&state) => {
                return Err(CloudError::TerminalState {
                    kind: target.kind,
                    id: target.id.clone(),
                    status: format!("{:?}", state),
                });
            }
            Ok(state) => {
                tracing::debug!(
                    "Waiting for {} {} to become {} ({}/{}): {:?}",
                    target.kind,
                    target.id,
                    target.goal,
                    attempt,
                    attempts,
                    state
                );
            }
            Err(e) => {
                tracing::debug!(
                    "Transient error polling {} {} ({}/{}): {}",
                    target.kind,
                    target.id,
                    attempt,
                    attempts,
                    e
                );
            }
        }

        if attempt < attempts {
            sleep(config.interval()).await;
        }
    }

    Err(CloudError::Timeout {
        kind: target.kind,
        id: target.id.clone(),
        goal: target.goal,
        attempts,
    })
}

/// One observation of an object that may not (or no longer) exist
struct Observed<V> {
    value: Option<V>,
}

impl<V: HasStatus> Observed<V> {
    fn status(&self) -> Option<ProvisioningStatus> {
        self.value.as_ref().map(|v| v.provisioning_status())
    }
}

impl<V: HasStatus> fmt::Debug for Observed<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "{}", status),
            None => write!(f, "ABSENT"),
        }
    }
}

/// Wait for an object to report `ACTIVE`; an absent object counts as pending
pub async fn wait_for_active<V, F, Fut>(
    target: &PollTarget,
    config: &PollConfig,
    mut fetch: F,
) -> Result<V>
where
    V: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<V>>>,
{
    let observed = wait_until(
        target,
        config,
        || {
            let next = fetch();
            async move { next.await.map(|value| Observed { value }) }
        },
        |o| o.status().is_some_and(|s| s.is_active()),
        |o| o.status().is_some_and(|s| s.is_terminal_failure()),
    )
    .await?;

    observed
        .value
        .ok_or_else(|| CloudError::ResourceNotFound(format!("{} {}", target.kind, target.id)))
}

/// Wait for an object to disappear
pub async fn wait_for_deleted<V, F, Fut>(
    target: &PollTarget,
    config: &PollConfig,
    mut fetch: F,
) -> Result<()>
where
    V: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<V>>>,
{
    wait_until(
        target,
        config,
        || {
            let next = fetch();
            async move { next.await.map(|value| Observed { value }) }
        },
        |o| matches!(o.status(), None | Some(ProvisioningStatus::Deleted)),
        |o| o.status().is_some_and(|s| s.is_terminal_failure()),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug)]
    struct Probe(ProvisioningStatus);

    impl HasStatus for Probe {
        fn provisioning_status(&self) -> ProvisioningStatus {
            self.0
        }
    }

    fn fast() -> PollConfig {
        PollConfig::new(Duration::from_millis(1000), 5)
    }

    /// Serves the given statuses in order, repeating the last one
    fn script(
        statuses: Vec<Option<ProvisioningStatus>>,
    ) -> impl FnMut() -> std::future::Ready<Result<Option<Probe>>> {
        let calls = Arc::new(AtomicU32::new(0));
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let status = statuses[n.min(statuses.len() - 1)];
            std::future::ready(Ok(status.map(Probe)))
        }
    }

    #[test]
    fn test_poll_config_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.max_attempts, 240);
        assert_eq!(config.budget(), Duration::from_secs(240));

        let parsed: PollConfig = serde_json::from_str(r#"{"interval_ms": 50}"#).unwrap();
        assert_eq!(parsed.interval_ms, 50);
        assert_eq!(parsed.max_attempts, 240);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_active_after_pending() {
        let target = PollTarget::active(ResourceKind::Pool, "pool-1");
        let fetch = script(vec![
            None,
            Some(ProvisioningStatus::PendingCreate),
            Some(ProvisioningStatus::Active),
        ]);

        let start = Instant::now();
        let settled = wait_for_active(&target, &fast(), fetch).await.unwrap();

        assert_eq!(settled.0, ProvisioningStatus::Active);
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(start.elapsed() < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_returns_immediately() {
        let target = PollTarget::active(ResourceKind::LoadBalancer, "lb-1");
        let fetch = script(vec![Some(ProvisioningStatus::Error)]);

        let start = Instant::now();
        let err = wait_for_active(&target, &fast(), fetch).await.unwrap_err();

        assert!(matches!(err, CloudError::TerminalState { ref status, .. } if status == "ERROR"));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_within_budget() {
        let config = fast();
        let target = PollTarget::active(ResourceKind::Listener, "l-1");
        let fetch = script(vec![Some(ProvisioningStatus::PendingCreate)]);

        let start = Instant::now();
        let err = wait_for_active(&target, &config, fetch).await.unwrap_err();

        assert!(matches!(err, CloudError::Timeout { attempts: 5, .. }));
        assert!(start.elapsed() <= config.budget());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_errors_are_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let target = PollTarget::active(ResourceKind::HealthMonitor, "hm-1");

        let state = wait_until(
            &target,
            &fast(),
            || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CloudError::ApiError("503".to_string()))
                    } else {
                        Ok(ProvisioningStatus::Active)
                    }
                }
            },
            |s| s.is_active(),
            |s| s.is_terminal_failure(),
        )
        .await
        .unwrap();

        assert_eq!(state, ProvisioningStatus::Active);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_fetch_errors_time_out() {
        let target = PollTarget::active(ResourceKind::Pool, "pool-9");
        let config = PollConfig::new(Duration::from_millis(10), 3);

        let err = wait_until(
            &target,
            &config,
            || async { Err::<ProvisioningStatus, _>(CloudError::ApiError("down".to_string())) },
            |s| s.is_active(),
            |s| s.is_terminal_failure(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CloudError::Timeout { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_deleted() {
        let target = PollTarget::deleted(ResourceKind::Listener, "l-1");
        let fetch = script(vec![Some(ProvisioningStatus::PendingDelete), None]);
        wait_for_deleted(&target, &fast(), fetch).await.unwrap();

        let fetch = script(vec![Some(ProvisioningStatus::Error)]);
        assert!(wait_for_deleted(&target, &fast(), fetch).await.is_err());
    }
}
