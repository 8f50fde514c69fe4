//! Test-only helpers, grounded on substrate-archive's `lib.rs` test
//! module: a `Once`-guarded logger/env init and a pooled connection to
//! the database named by `DATABASE_URL`.

use std::sync::Once;

use sqlx::postgres::PgPool;

static INIT: Once = Once::new();

/// Guard that should be called at the beginning of every test needing
/// logging output or environment variables from `.env`.
pub fn initialize() {
	INIT.call_once(|| {
		dotenv::dotenv().ok();
		let _ = pretty_env_logger::try_init();
	});
}

/// Connects to the database named by `DATABASE_URL`, running migrations
/// first. Panics if the variable is unset; integration tests that need a
/// live database are expected to set it (see spec.md §7d).
pub async fn test_pool() -> PgPool {
	initialize();
	let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set to run database-backed tests");
	crate::database::migrate(&url).await.expect("failed to run migrations against test database");
	PgPool::connect(&url).await.expect("failed to connect to test database")
}
