//! Request interception.

use super::{Request, SharedRandom};
use async_trait::async_trait;
use chaos_core::RandomSource;
use chaos_types::InjectedFault;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What a route does to a matching request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    /// Drop the request.
    Abort,
    /// Hold the request for `base` ± `jitter` (relative) before continuing.
    Delay {
        /// Base delay.
        base: Duration,
        /// Relative jitter, e.g. 0.3 for ±30%.
        jitter: f64,
    },
    /// Answer with an error status.
    Fail {
        /// Status code.
        status: u16,
    },
}

impl RouteAction {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delay { .. })
    }
}

/// Handle to an installed route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// What interception did to a request that was allowed through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interception {
    /// Total delay applied.
    pub delayed: Duration,
    /// Delay routes that matched.
    pub matched_routes: usize,
}

impl Interception {
    /// Returns true if any route touched the request.
    pub fn touched(&self) -> bool {
        self.matched_routes > 0
    }
}

/// Request interception layer.
///
/// Implementations decide, per request, whether it is dropped, failed or
/// delayed. The environment consults this before the dependency registry.
#[async_trait]
pub trait Interceptor: Send + Sync + fmt::Debug {
    /// Install a route for URLs matching `pattern` (glob, `*` = any run).
    fn route(&self, pattern: &str, action: RouteAction) -> RouteId;

    /// Remove a route. Returns false if it was not installed.
    fn unroute(&self, id: RouteId) -> bool;

    /// Take the network offline. While any hold is outstanding every
    /// request fails.
    fn hold_offline(&self);

    /// Give back one hold taken with [`hold_offline`](Self::hold_offline).
    /// The network comes back once the last hold is released.
    fn release_offline(&self);

    /// Returns true while at least one offline hold is outstanding.
    fn is_offline(&self) -> bool;

    /// Installed routes.
    fn route_count(&self) -> usize;

    /// Apply interception to `request`, sleeping for any delay.
    async fn intercept(&self, request: &Request) -> Result<Interception, InjectedFault>;
}

#[derive(Debug)]
struct Route {
    id: RouteId,
    pattern: String,
    action: RouteAction,
}

#[derive(Debug, Default)]
struct Routes {
    installed: Vec<Route>,
    next_id: u64,
}

/// In-process [`Interceptor`].
///
/// The most recently installed matching route decides terminal actions
/// (abort/fail); every matching delay route adds its delay.
#[derive(Debug)]
pub struct SimulatedNetwork {
    routes: Mutex<Routes>,
    offline_holds: AtomicUsize,
    random: SharedRandom,
}

impl SimulatedNetwork {
    /// Create a network with no routes, drawing jitter from `random`.
    pub fn new(random: SharedRandom) -> Self {
        Self {
            routes: Mutex::new(Routes::default()),
            offline_holds: AtomicUsize::new(0),
            random,
        }
    }

    /// Patterns of the installed routes, oldest first.
    pub fn patterns(&self) -> Vec<String> {
        self.lock().installed.iter().map(|r| r.pattern.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve matching routes into a delay and an optional terminal fault.
    fn resolve(&self, url: &str) -> (Interception, Option<InjectedFault>) {
        let routes = self.lock();
        let mut random = self.random.clone();
        let mut interception = Interception::default();
        let mut terminal = None;

        for route in routes.installed.iter().rev() {
            if !glob_match(&route.pattern, url) {
                continue;
            }
            match &route.action {
                RouteAction::Delay { base, jitter } => {
                    let factor = random.jitter_factor(*jitter).max(0.0);
                    interception.delayed += base.mul_f64(factor);
                    interception.matched_routes += 1;
                }
                action if terminal.is_none() && action.is_terminal() => {
                    terminal = Some(match action {
                        RouteAction::Fail { status } => InjectedFault::Failed {
                            url: url.to_string(),
                            status: *status,
                        },
                        _ => InjectedFault::Aborted {
                            url: url.to_string(),
                            pattern: route.pattern.clone(),
                        },
                    });
                }
                _ => {}
            }
        }
        (interception, terminal)
    }
}

#[async_trait]
impl Interceptor for SimulatedNetwork {
    fn route(&self, pattern: &str, action: RouteAction) -> RouteId {
        let mut routes = self.lock();
        let id = RouteId(routes.next_id);
        routes.next_id += 1;
        tracing::debug!(%id, pattern, ?action, "Route installed");
        routes.installed.push(Route {
            id,
            pattern: pattern.to_string(),
            action,
        });
        id
    }

    fn unroute(&self, id: RouteId) -> bool {
        let mut routes = self.lock();
        let before = routes.installed.len();
        routes.installed.retain(|r| r.id != id);
        let removed = routes.installed.len() != before;
        if removed {
            tracing::debug!(%id, "Route removed");
        }
        removed
    }

    fn hold_offline(&self) {
        let holds = self.offline_holds.fetch_add(1, Ordering::SeqCst) + 1;
        if holds == 1 {
            tracing::info!("Network offline");
        } else {
            tracing::debug!(holds, "Network offline hold added");
        }
    }

    fn release_offline(&self) {
        let released =
            self.offline_holds
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match released {
            Ok(1) => tracing::info!("Network back online"),
            Ok(prev) => tracing::debug!(holds = prev - 1, "Network offline hold released"),
            Err(_) => tracing::warn!("Offline release without a matching hold"),
        }
    }

    fn is_offline(&self) -> bool {
        self.offline_holds.load(Ordering::SeqCst) > 0
    }

    fn route_count(&self) -> usize {
        self.lock().installed.len()
    }

    async fn intercept(&self, request: &Request) -> Result<Interception, InjectedFault> {
        if self.is_offline() {
            return Err(InjectedFault::NetworkOffline {
                url: request.url.clone(),
            });
        }

        let (interception, terminal) = self.resolve(&request.url);
        if !interception.delayed.is_zero() {
            tokio::time::sleep(interception.delayed).await;
        }
        match terminal {
            Some(fault) => Err(fault),
            None => Ok(interception),
        }
    }
}

/// Match `text` against a glob where `*` matches any run of characters
/// (including none). Every other character matches itself.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            // Let the last star swallow one more character.
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}
