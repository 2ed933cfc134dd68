//! Host environment that fault injectors act on.
//!
//! An [`Environment`] is a cheaply cloneable handle over:
//! - [`Interceptor`] - request routing with abort/delay/fail rules and an offline flag
//! - [`DependencyRegistry`] - named services that can be put into an outage
//! - [`SkewedClock`] - the perceived wall clock
//! - [`Storage`] - an in-memory store whose write path can carry corruptors
//! - [`RequestStats`] - request counters used for result metrics
//!
//! Requests address a service by URL host (`http://<service>/<path>`).
//!
//! # Example
//!
//! ```ignore
//! let env = Environment::new();
//! let response = env.dispatch(Request::get("http://database/users/1")).await?;
//! assert_eq!(response.status, 200);
//! ```

mod clock;
mod dependencies;
mod network;
mod storage;

pub use clock::SkewedClock;
pub use dependencies::{DependencyRegistry, OutageId};
pub use network::{glob_match, Interception, Interceptor, RouteAction, RouteId, SimulatedNetwork};
pub use storage::{Corruptor, CorruptorId, Storage};

use chaos_core::{RandomSource, SeededRandom, ThreadRandom};
use chaos_types::InjectedFault;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A request travelling through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP-style method.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Payload.
    pub body: Vec<u8>,
}

impl Request {
    /// A GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            body: Vec::new(),
        }
    }

    /// A POST request with a payload.
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".into(),
            url: url.into(),
            body: body.into(),
        }
    }

    /// Service name taken from the URL host, if the URL has one.
    pub fn service(&self) -> Option<&str> {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
        let host = host.split(':').next().unwrap_or_default();
        (!host.is_empty()).then_some(host)
    }
}

/// Response from a healthy service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Service that answered.
    pub service: String,
    /// Echoed payload.
    pub body: Vec<u8>,
}

/// Snapshot of the request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    /// Requests dispatched.
    pub total: u64,
    /// Requests that failed with an injected fault.
    pub failed: u64,
    /// Requests touched by an injected rule or outage.
    pub affected: u64,
}

impl RequestCounts {
    /// Counts accumulated since `baseline`.
    pub fn since(&self, baseline: &RequestCounts) -> RequestCounts {
        RequestCounts {
            total: self.total.saturating_sub(baseline.total),
            failed: self.failed.saturating_sub(baseline.failed),
            affected: self.affected.saturating_sub(baseline.affected),
        }
    }

    /// Failed over total, 0 when nothing was dispatched.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Request counters.
#[derive(Debug, Default)]
pub struct RequestStats {
    total: AtomicU64,
    failed: AtomicU64,
    affected: AtomicU64,
}

impl RequestStats {
    /// Current counts.
    pub fn snapshot(&self) -> RequestCounts {
        RequestCounts {
            total: self.total.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            affected: self.affected.load(Ordering::Relaxed),
        }
    }

    fn record(&self, failed: bool, affected: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if affected {
            self.affected.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A [`RandomSource`] shared by everything in one environment.
#[derive(Clone)]
pub struct SharedRandom(Arc<Mutex<Box<dyn RandomSource>>>);

impl SharedRandom {
    /// Wrap a random source.
    pub fn new(source: Box<dyn RandomSource>) -> Self {
        Self(Arc::new(Mutex::new(source)))
    }
}

impl fmt::Debug for SharedRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedRandom").finish()
    }
}

impl RandomSource for SharedRandom {
    fn sample(&mut self) -> f64 {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).sample()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(dest)
    }
}

#[derive(Debug)]
struct EnvInner {
    network: Arc<dyn Interceptor>,
    dependencies: DependencyRegistry,
    clock: SkewedClock,
    storage: Storage,
    stats: RequestStats,
    random: SharedRandom,
}

/// Shared handle to the host environment.
#[derive(Debug, Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Environment with a [`SimulatedNetwork`] and the thread RNG.
    pub fn new() -> Self {
        Self::with_random(SharedRandom::new(Box::new(ThreadRandom)))
    }

    /// Reproducible environment seeded with `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::with_random(SharedRandom::new(Box::new(SeededRandom::new(seed))))
    }

    /// Environment drawing randomness from `random`.
    pub fn with_random(random: SharedRandom) -> Self {
        let network = Arc::new(SimulatedNetwork::new(random.clone()));
        Self::with_interceptor(network, random)
    }

    /// Environment with a custom interception layer.
    pub fn with_interceptor(network: Arc<dyn Interceptor>, random: SharedRandom) -> Self {
        Self {
            inner: Arc::new(EnvInner {
                network,
                dependencies: DependencyRegistry::new(),
                clock: SkewedClock::new(),
                storage: Storage::new(),
                stats: RequestStats::default(),
                random,
            }),
        }
    }

    /// Request interception layer.
    pub fn network(&self) -> &dyn Interceptor {
        self.inner.network.as_ref()
    }

    /// Dependency registry.
    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.inner.dependencies
    }

    /// Perceived clock.
    pub fn clock(&self) -> &SkewedClock {
        &self.inner.clock
    }

    /// Persistent storage.
    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Request counters.
    pub fn stats(&self) -> &RequestStats {
        &self.inner.stats
    }

    /// Handle to the environment's random source.
    pub fn random(&self) -> SharedRandom {
        self.inner.random.clone()
    }

    /// Send a request through interception and the dependency registry.
    pub async fn dispatch(&self, request: Request) -> Result<Response, InjectedFault> {
        let interception = match self.inner.network.intercept(&request).await {
            Ok(interception) => interception,
            Err(fault) => {
                self.inner.stats.record(true, true);
                tracing::trace!(url = %request.url, %fault, "Request intercepted");
                return Err(fault);
            }
        };

        let service = request.service().unwrap_or_default().to_string();
        if let Err(fault) = self.inner.dependencies.check(&service) {
            self.inner.stats.record(true, true);
            tracing::trace!(%service, %fault, "Dependency unavailable");
            return Err(fault);
        }

        self.inner.stats.record(false, interception.touched());
        Ok(Response {
            status: 200,
            service,
            body: request.body,
        })
    }
}
