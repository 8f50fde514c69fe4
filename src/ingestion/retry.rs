//! Exponential-backoff retry, ported from
//! `original_source/.../ingestion/base.py::RetryConfig`/`with_retry`.

use std::future::Future;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
	pub max_retries: u32,
	pub base_delay_secs: f64,
	pub max_delay_secs: f64,
	pub exponential_base: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		RetryConfig { max_retries: 3, base_delay_secs: 1.0, max_delay_secs: 60.0, exponential_base: 2.0 }
	}
}

/// Execute `func` with exponential backoff. Reproduces
/// `with_retry`'s exact delay formula:
/// `delay = min(base_delay * exponential_base ** attempt, max_delay)`.
pub async fn with_retry<F, Fut, T>(mut func: F, config: RetryConfig) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut last_error = None;

	for attempt in 0..=config.max_retries {
		match func().await {
			Ok(value) => return Ok(value),
			Err(e) => {
				if attempt < config.max_retries {
					let delay = (config.base_delay_secs * config.exponential_base.powi(attempt as i32)).min(config.max_delay_secs);
					log::warn!("attempt {} failed: {}. retrying in {:.1}s", attempt + 1, e, delay);
					tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
				} else {
					log::error!("all {} attempts failed", config.max_retries + 1);
				}
				last_error = Some(e);
			}
		}
	}

	Err(last_error.expect("with_retry always records the last error before exhausting"))
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;
	use crate::error::MitdsError;

	#[tokio::test]
	async fn succeeds_without_retry_on_first_try() {
		let calls = AtomicU32::new(0);
		let result = with_retry(
			|| {
				calls.fetch_add(1, Ordering::SeqCst);
				async { Ok::<_, MitdsError>(42) }
			},
			RetryConfig::default(),
		)
		.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn retries_then_succeeds() {
		let calls = AtomicU32::new(0);
		let config = RetryConfig { max_retries: 3, base_delay_secs: 0.001, max_delay_secs: 0.01, exponential_base: 2.0 };
		let result = with_retry(
			|| {
				let n = calls.fetch_add(1, Ordering::SeqCst);
				async move {
					if n < 2 {
						Err(MitdsError::Fatal("transient".into()))
					} else {
						Ok(7)
					}
				}
			},
			config,
		)
		.await;
		assert_eq!(result.unwrap(), 7);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn exhausts_retries_and_returns_last_error() {
		let config = RetryConfig { max_retries: 2, base_delay_secs: 0.001, max_delay_secs: 0.01, exponential_base: 2.0 };
		let result: Result<()> =
			with_retry(|| async { Err(MitdsError::Fatal("still failing".into())) }, config).await;
		assert!(result.is_err());
	}
}
