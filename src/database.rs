//! PostgreSQL connection pool and schema migration.
//!
//! Grounded on substrate-archive's `database.rs`: `migrate()` running
//! `sqlx::migrate!`, `DatabaseConfig { url }` with a `Display` impl, and a
//! `Database { pool, url }` wrapper around `PgPoolOptions`.

pub mod batch;
pub mod queries;

use std::fmt;

use serde::Deserialize;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;

use crate::error::Result;

pub async fn migrate<T: AsRef<str>>(url: T) -> Result<()> {
	let mut conn = PgConnection::connect(url.as_ref()).await?;
	sqlx::migrate!("./src/migrations/").run(&mut conn).await?;
	Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DatabaseConfig {
	pub url: String,
}

impl fmt::Display for DatabaseConfig {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.url)
	}
}

#[derive(Clone)]
pub struct Database {
	pool: PgPool,
	url: String,
}

impl Database {
	pub async fn new(url: String) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.min_connections(4)
			.max_connections(28)
			.idle_timeout(std::time::Duration::from_secs(8 * 3600))
			.connect(&url)
			.await?;
		Ok(Database { pool, url })
	}

	pub fn with_pool(pool: PgPool, url: String) -> Self {
		Database { pool, url }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}
