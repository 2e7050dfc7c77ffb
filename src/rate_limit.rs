// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

//! Per-client request limiting over a sliding window.
//!
//! Each client (keyed by source IP) may issue at most `max_requests` within
//! the last `window_secs` seconds. Idle clients are dropped every
//! `cleanup_interval` checks, and the number of tracked clients never
//! exceeds `max_tracked_clients`: once full, unknown clients are rejected
//! until cleanup frees room.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RateLimitConfig {
    pub(crate) max_requests: u32,
    pub(crate) window_secs: u64,
    /// Run cleanup every this many checks.
    pub(crate) cleanup_interval: u64,
    pub(crate) max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
            cleanup_interval: 100,
            max_tracked_clients: 10_000,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RateLimitError {
    #[error("client {0} exceeded the request limit")]
    Exceeded(IpAddr),

    #[error("client table is full, rejecting new client {0}")]
    TooManyClients(IpAddr),
}

#[derive(Debug)]
pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    clients: RwLock<HashMap<IpAddr, Vec<Instant>>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub(crate) fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    /// Seconds until `ip` regains quota, rounded up and at least one.
    ///
    /// Clients that are not tracked wait a full window.
    pub(crate) fn retry_after(&self, ip: IpAddr) -> u64 {
        let now = Instant::now();
        let cutoff = self.cutoff(now);
        let window = Duration::from_secs(self.config.window_secs);
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);

        let Some(oldest) = clients
            .get(&ip)
            .and_then(|timestamps| timestamps.iter().filter(|&&t| t > cutoff).min().copied())
        else {
            return self.config.window_secs.max(1);
        };

        let remaining = window.saturating_sub(now.duration_since(oldest));
        (remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)).max(1)
    }

    fn cutoff(&self, now: Instant) -> Instant {
        now.checked_sub(Duration::from_secs(self.config.window_secs))
            .unwrap_or(now)
    }

    /// Records a request from `ip`, or rejects it if `ip` is over its quota.
    pub(crate) fn check(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let cutoff = self.cutoff(now);

        let count = self.checks.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.config.cleanup_interval == 0 {
            log::debug!("cleaning up rate limiter after {count} checks");
            self.cleanup();
        }

        let full = {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);

            match clients.get(&ip) {
                Some(timestamps) => {
                    let recent = timestamps.iter().filter(|&&t| t > cutoff).count();
                    if recent >= self.config.max_requests as usize {
                        log::warn!("rate limit exceeded by {ip} ({recent} requests)");
                        return Err(RateLimitError::Exceeded(ip));
                    }
                    false
                }
                None => clients.len() >= self.config.max_tracked_clients,
            }
        };

        if full {
            self.cleanup();
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);

        // another request may have filled the table since the read above
        if !clients.contains_key(&ip) && clients.len() >= self.config.max_tracked_clients {
            log::warn!(
                "rejecting {ip}: tracking {} clients already",
                clients.len()
            );
            return Err(RateLimitError::TooManyClients(ip));
        }

        let timestamps = clients.entry(ip).or_default();
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= self.config.max_requests as usize {
            log::warn!(
                "rate limit exceeded by {ip} ({} requests)",
                timestamps.len()
            );
            return Err(RateLimitError::Exceeded(ip));
        }

        timestamps.push(now);

        Ok(())
    }

    /// Forgets every client without a request inside the window.
    pub(crate) fn cleanup(&self) {
        let cutoff = self.cutoff(Instant::now());
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);

        clients.retain(|_, timestamps| {
            timestamps.retain(|&t| t > cutoff);
            !timestamps.is_empty()
        });
        log::debug!("rate limiter tracks {} clients", clients.len());
    }

    #[cfg(test)]
    pub(crate) fn tracked_clients(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Middleware rejecting requests from clients over their quota.
///
/// Requests without connection info (e.g. driven in-process) share the
/// unspecified address as their key.
pub(crate) async fn limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match limiter.check(ip) {
        Ok(()) => next.run(request).await,
        Err(_) => ApiError::RateLimited {
            retry_after: limiter.retry_after(ip),
        }
        .into_response(),
    }
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv4Addr};
    use std::thread;
    use std::time::Duration;

    use test_log::test;

    use super::{RateLimitConfig, RateLimitError, RateLimiter};

    fn client() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))
    }

    fn other_client() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2))
    }

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs,
            ..Default::default()
        })
    }

    #[test]
    fn admits_up_to_quota() {
        let limiter = limiter(5, 60);

        for _ in 0..5 {
            assert!(limiter.check(client()).is_ok());
        }
        assert_eq!(
            limiter.check(client()),
            Err(RateLimitError::Exceeded(client()))
        );
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(2, 60);

        assert!(limiter.check(client()).is_ok());
        assert!(limiter.check(client()).is_ok());
        assert!(limiter.check(client()).is_err());

        assert!(limiter.check(other_client()).is_ok());
        assert!(limiter.check(other_client()).is_ok());
        assert!(limiter.check(other_client()).is_err());
    }

    #[test]
    fn window_slides() {
        let limiter = limiter(2, 1);

        assert!(limiter.check(client()).is_ok());
        assert!(limiter.check(client()).is_ok());
        assert!(limiter.check(client()).is_err());

        thread::sleep(Duration::from_millis(1100));

        assert!(limiter.check(client()).is_ok());
    }

    #[test]
    fn retry_after_counts_down() {
        let limiter = limiter(1, 2);

        assert!(limiter.check(client()).is_ok());
        assert_eq!(limiter.retry_after(client()), 2);

        thread::sleep(Duration::from_millis(1100));

        assert!(limiter.check(client()).is_err());
        assert_eq!(limiter.retry_after(client()), 1);
        assert_eq!(limiter.retry_after(other_client()), 2);
    }

    #[test]
    fn cleanup_forgets_idle_clients() {
        let limiter = limiter(10, 1);

        assert!(limiter.check(client()).is_ok());
        assert!(limiter.check(other_client()).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);

        thread::sleep(Duration::from_millis(1100));
        limiter.cleanup();

        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn client_table_is_bounded() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 10,
            window_secs: 60,
            max_tracked_clients: 1,
            ..Default::default()
        });

        assert!(limiter.check(client()).is_ok());
        assert_eq!(
            limiter.check(other_client()),
            Err(RateLimitError::TooManyClients(other_client()))
        );
        // known clients keep their quota
        assert!(limiter.check(client()).is_ok());
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
