//! Per-backend resilience: bounded exponential-backoff retries and a
//! three-state circuit breaker. The breaker trips after a run of consecutive
//! failures, rejects calls for a cooldown, then lets one probe through.

use std::{
	future::Future,
	sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	},
	time::{Duration, Instant},
};

use ember_domain::MemoryDocument;

use crate::{BackendAdapter, BoxFuture, Error, Result, ScoredDocument, SearchSpec};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl RetryPolicy {
	pub fn from_config(cfg: &ember_config::Resilience) -> Self {
		Self {
			max_retries: cfg.max_retries,
			base_delay: Duration::from_millis(cfg.base_delay_ms),
			max_delay: Duration::from_millis(cfg.max_delay_ms),
		}
	}

	/// Delay before retry `attempt` (zero-based): base doubled per attempt,
	/// capped at the maximum.
	pub fn delay(&self, attempt: u32) -> Duration {
		let factor = 2_u32.saturating_pow(attempt);

		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
	Closed,
	Open,
	HalfOpen,
}

struct BreakerInner {
	state: BreakerState,
	consecutive_failures: u32,
	opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
	failure_threshold: u32,
	cooldown: Duration,
	inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
	pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
		Self {
			failure_threshold: failure_threshold.max(1),
			cooldown,
			inner: Mutex::new(BreakerInner {
				state: BreakerState::Closed,
				consecutive_failures: 0,
				opened_at: None,
			}),
		}
	}

	pub fn from_config(cfg: &ember_config::Resilience) -> Self {
		Self::new(cfg.breaker_failure_threshold, Duration::from_millis(cfg.breaker_cooldown_ms))
	}

	pub fn state(&self) -> BreakerState {
		self.inner.lock().map(|inner| inner.state).unwrap_or(BreakerState::Open)
	}

	/// Whether a call may proceed. After the cooldown an open breaker moves
	/// to half-open and admits exactly one probe.
	pub fn allow(&self) -> bool {
		let Ok(mut inner) = self.inner.lock() else {
			return false;
		};

		match inner.state {
			BreakerState::Closed => true,
			BreakerState::HalfOpen => false,
			BreakerState::Open => {
				let elapsed =
					inner.opened_at.map(|at| at.elapsed() >= self.cooldown).unwrap_or(true);

				if elapsed {
					inner.state = BreakerState::HalfOpen;

					true
				} else {
					false
				}
			},
		}
	}

	pub fn record_success(&self) {
		if let Ok(mut inner) = self.inner.lock() {
			inner.state = BreakerState::Closed;
			inner.consecutive_failures = 0;
			inner.opened_at = None;
		}
	}

	pub fn record_failure(&self) {
		if let Ok(mut inner) = self.inner.lock() {
			inner.consecutive_failures += 1;

			if inner.state == BreakerState::HalfOpen
				|| inner.consecutive_failures >= self.failure_threshold
			{
				inner.state = BreakerState::Open;
				inner.opened_at = Some(Instant::now());
			}
		}
	}
}

/// Wraps an adapter with retries and a breaker while keeping the
/// [`BackendAdapter`] surface, so the chain composes resilient and plain
/// backends alike.
pub struct ResilientBackend {
	inner: Arc<dyn BackendAdapter>,
	policy: RetryPolicy,
	breaker: CircuitBreaker,
	attempts: AtomicU32,
}

impl ResilientBackend {
	pub fn new(inner: Arc<dyn BackendAdapter>, cfg: &ember_config::Resilience) -> Self {
		Self {
			inner,
			policy: RetryPolicy::from_config(cfg),
			breaker: CircuitBreaker::from_config(cfg),
			attempts: AtomicU32::new(0),
		}
	}

	pub fn breaker_state(&self) -> BreakerState {
		self.breaker.state()
	}

	/// Total calls issued to the wrapped adapter, retries included.
	pub fn attempts(&self) -> u32 {
		self.attempts.load(Ordering::Relaxed)
	}

	async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		if !self.breaker.allow() {
			return Err(Error::CircuitOpen(self.inner.name()));
		}

		let mut attempt = 0;

		loop {
			self.attempts.fetch_add(1, Ordering::Relaxed);

			match call().await {
				Ok(value) => {
					self.breaker.record_success();

					return Ok(value);
				},
				Err(err) => {
					self.breaker.record_failure();

					if attempt >= self.policy.max_retries {
						return Err(err);
					}

					let delay = self.policy.delay(attempt);

					tracing::debug!(
						backend = self.inner.name(),
						attempt,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"Retrying backend call.",
					);
					tokio::time::sleep(delay).await;

					if !self.breaker.allow() {
						return Err(Error::CircuitOpen(self.inner.name()));
					}

					attempt += 1;
				},
			}
		}
	}
}

impl BackendAdapter for ResilientBackend {
	fn name(&self) -> &'static str {
		self.inner.name()
	}

	fn store<'a>(&'a self, doc: &'a MemoryDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.with_retries(move || self.inner.store(doc)))
	}

	fn search<'a>(&'a self, spec: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>> {
		Box::pin(self.with_retries(move || self.inner.search(spec)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ember_domain::QueryFilters;

	struct AlwaysDown;
	impl BackendAdapter for AlwaysDown {
		fn name(&self) -> &'static str {
			"down"
		}

		fn store<'a>(&'a self, _: &'a MemoryDocument) -> BoxFuture<'a, Result<()>> {
			Box::pin(async { Err(Error::InvalidResponse("down".to_string())) })
		}

		fn search<'a>(&'a self, _: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>> {
			Box::pin(async { Err(Error::InvalidResponse("down".to_string())) })
		}
	}

	fn resilience(max_retries: u32, threshold: u32) -> ember_config::Resilience {
		ember_config::Resilience {
			max_retries,
			base_delay_ms: 0,
			max_delay_ms: 0,
			breaker_failure_threshold: threshold,
			breaker_cooldown_ms: 60_000,
		}
	}

	#[test]
	fn delay_doubles_and_caps() {
		let policy = RetryPolicy {
			max_retries: 5,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_millis(250),
		};

		assert_eq!(policy.delay(0), Duration::from_millis(100));
		assert_eq!(policy.delay(1), Duration::from_millis(200));
		assert_eq!(policy.delay(2), Duration::from_millis(250));
	}

	#[test]
	fn breaker_opens_after_threshold_and_admits_one_probe() {
		let breaker = CircuitBreaker::new(2, Duration::ZERO);

		breaker.record_failure();
		assert_eq!(breaker.state(), BreakerState::Closed);
		breaker.record_failure();
		assert_eq!(breaker.state(), BreakerState::Open);

		// Cooldown of zero: the next allow() is the half-open probe, and the
		// one after it is rejected.
		assert!(breaker.allow());
		assert!(!breaker.allow());

		breaker.record_success();
		assert_eq!(breaker.state(), BreakerState::Closed);
	}

	#[tokio::test]
	async fn retries_exhaust_then_surface_the_error() {
		let backend = ResilientBackend::new(Arc::new(AlwaysDown), &resilience(2, 100));
		let spec = SearchSpec { vector: vec![1.0], limit: 1, filters: QueryFilters::default() };

		assert!(backend.search(&spec).await.is_err());
		assert_eq!(backend.attempts(), 3);
	}

	#[tokio::test]
	async fn open_circuit_rejects_without_calling_through() {
		let backend = ResilientBackend::new(Arc::new(AlwaysDown), &resilience(0, 1));
		let spec = SearchSpec { vector: vec![1.0], limit: 1, filters: QueryFilters::default() };

		// First call trips the breaker (threshold 1, no retries).
		assert!(backend.search(&spec).await.is_err());

		let before = backend.attempts();
		let err = backend.search(&spec).await.unwrap_err();

		assert!(matches!(err, Error::CircuitOpen(_)));
		assert_eq!(backend.attempts(), before);
	}
}
