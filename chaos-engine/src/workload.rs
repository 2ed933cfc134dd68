//! Simulated clients driving traffic through the resilience primitives.
//!
//! Each client loops: lease a pool slot, send one request through the retry
//! executor wrapping the circuit breaker, release the slot, pause. Clients
//! finish their in-flight request before honouring shutdown, so leases are
//! always returned.

use crate::environment::{Environment, Request};
use chaos_resilience::{
    BackoffExecutor, BreakerError, CircuitBreaker, LeaseManager, PoolError, RetryError,
};
use chaos_types::InjectedFault;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Simulated client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Concurrent clients.
    pub clients: usize,
    /// Pause after each request.
    pub request_interval: Duration,
    /// Services called, round-robin per client.
    pub targets: Vec<String>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            clients: 4,
            request_interval: Duration::from_millis(100),
            targets: vec!["api".into(), "database".into(), "cache".into()],
        }
    }
}

/// How one workload request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request succeeded, possibly after retries.
    Succeeded,
    /// The breaker rejected the call without running it.
    CircuitOpen,
    /// No pool slot became free in time.
    PoolTimeout,
    /// Every retry attempt failed.
    RetriesExhausted,
    /// Any other failure (fatal fault, expired lease, trial timeout).
    Failed,
}

/// Totals reported when a workload stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WorkloadReport {
    /// Requests started.
    pub attempted: u64,
    /// Requests that succeeded.
    pub succeeded: u64,
    /// Requests that did not succeed, for any reason.
    pub failed: u64,
    /// Failures caused by an open circuit.
    pub circuit_rejections: u64,
    /// Failures caused by pool timeouts.
    pub pool_timeouts: u64,
    /// Failures after the retry budget ran out.
    pub retry_exhaustions: u64,
    /// Succeeded over attempted; 1.0 when nothing was attempted.
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    circuit_rejections: AtomicU64,
    pool_timeouts: AtomicU64,
    retry_exhaustions: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: RequestOutcome) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        let bucket = match outcome {
            RequestOutcome::Succeeded => &self.succeeded,
            RequestOutcome::CircuitOpen => &self.circuit_rejections,
            RequestOutcome::PoolTimeout => &self.pool_timeouts,
            RequestOutcome::RetriesExhausted => &self.retry_exhaustions,
            RequestOutcome::Failed => return,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self) -> WorkloadReport {
        let attempted = self.attempted.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        WorkloadReport {
            attempted,
            succeeded,
            failed: attempted.saturating_sub(succeeded),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            pool_timeouts: self.pool_timeouts.load(Ordering::Relaxed),
            retry_exhaustions: self.retry_exhaustions.load(Ordering::Relaxed),
            success_rate: if attempted == 0 {
                1.0
            } else {
                succeeded as f64 / attempted as f64
            },
        }
    }
}

#[derive(Debug)]
struct WorkloadInner {
    env: Environment,
    config: WorkloadConfig,
    leases: LeaseManager,
    breaker: CircuitBreaker,
    retry: BackoffExecutor,
    counters: Counters,
}

/// Simulated client population sharing one pool, breaker and retry policy.
#[derive(Debug, Clone)]
pub struct Workload {
    inner: Arc<WorkloadInner>,
}

impl Workload {
    /// Assemble a workload from its primitives.
    pub fn new(
        env: Environment,
        config: WorkloadConfig,
        leases: LeaseManager,
        breaker: CircuitBreaker,
        retry: BackoffExecutor,
    ) -> Self {
        Self {
            inner: Arc::new(WorkloadInner {
                env,
                config,
                leases,
                breaker,
                retry,
                counters: Counters::default(),
            }),
        }
    }

    /// Breaker guarding every request.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// Lease pool bounding concurrency.
    pub fn leases(&self) -> &LeaseManager {
        &self.inner.leases
    }

    /// Totals so far.
    pub fn report(&self) -> WorkloadReport {
        self.inner.counters.report()
    }

    /// Send one request to `target` and record the outcome.
    pub async fn request(&self, target: &str) -> RequestOutcome {
        let outcome = self.send(target).await;
        self.inner.counters.record(outcome);
        outcome
    }

    async fn send(&self, target: &str) -> RequestOutcome {
        let inner = &self.inner;
        let lease = match inner.leases.lease().await {
            Ok(lease) => lease,
            Err(PoolError::Timeout { waited, .. }) => {
                tracing::debug!(target, ?waited, "Workload request timed out waiting for pool");
                return RequestOutcome::PoolTimeout;
            }
            Err(e) => {
                tracing::debug!(target, error = %e, "Workload lease failed");
                return RequestOutcome::Failed;
            }
        };

        let url = format!("http://{target}/work");
        let result = inner
            .leases
            .perform(&lease, |_| {
                inner.retry.execute_if(
                    "workload-request",
                    || {
                        inner
                            .breaker
                            .execute(|| inner.env.dispatch(Request::get(url.clone())))
                    },
                    is_retryable,
                )
            })
            .await;
        inner.leases.release(&lease);

        match result {
            Ok(Ok(_)) => RequestOutcome::Succeeded,
            Ok(Err(RetryError::MaxRetriesExceeded { last_error, .. })) if last_error.is_open() => {
                RequestOutcome::CircuitOpen
            }
            Ok(Err(RetryError::MaxRetriesExceeded { .. })) => RequestOutcome::RetriesExhausted,
            Ok(Err(RetryError::NonRetryable { error, .. })) if error.is_open() => {
                RequestOutcome::CircuitOpen
            }
            Ok(Err(_)) | Err(_) => RequestOutcome::Failed,
        }
    }

    /// Start every client and the lease sweeper.
    pub fn start(&self) -> RunningWorkload {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let clients = (0..self.inner.config.clients)
            .map(|client| {
                let workload = self.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { workload.client_loop(client, shutdown).await })
            })
            .collect();
        let sweeper = self.inner.leases.spawn_sweeper();

        tracing::info!(
            clients = self.inner.config.clients,
            interval = ?self.inner.config.request_interval,
            "Workload started"
        );
        RunningWorkload {
            workload: self.clone(),
            shutdown,
            clients,
            sweeper,
        }
    }

    async fn client_loop(&self, client: usize, mut shutdown: watch::Receiver<bool>) {
        let targets = &self.inner.config.targets;
        if targets.is_empty() {
            return;
        }

        let mut seq = client;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let target = &targets[seq % targets.len()];
            let outcome = self.request(target).await;
            tracing::trace!(client, %target, ?outcome, "Workload request");
            seq += 1;

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.inner.config.request_interval) => {}
            }
        }
    }
}

/// Fatal faults and open circuits are not worth retrying.
fn is_retryable(error: &BreakerError<InjectedFault>) -> bool {
    match error {
        BreakerError::Open { .. } => false,
        BreakerError::TrialTimeout { .. } => true,
        BreakerError::Inner(fault) => !fault.is_fatal(),
    }
}

/// Handle to a started workload.
#[derive(Debug)]
pub struct RunningWorkload {
    workload: Workload,
    shutdown: watch::Sender<bool>,
    clients: Vec<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
}

impl RunningWorkload {
    /// Totals so far.
    pub fn report(&self) -> WorkloadReport {
        self.workload.report()
    }

    /// Signal shutdown, wait for in-flight requests and return the totals.
    pub async fn stop(self) -> WorkloadReport {
        let _ = self.shutdown.send(true);
        for client in self.clients {
            if let Err(e) = client.await {
                tracing::error!("Workload client failed: {}", e);
            }
        }
        self.sweeper.abort();

        let report = self.workload.report();
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            success_rate = report.success_rate,
            "Workload stopped"
        );
        report
    }
}
