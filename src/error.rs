//! Error taxonomy for the MITDS core.
//!
//! Grounded on substrate-archive's `error.rs`: external-crate `#[from]`
//! variants first, domain-specific variants after. Blockchain-specific
//! variants are dropped; the variants named in spec §7 (validation,
//! permanent record, merge-key conflict, rate limit) are added.

use std::fmt;

use thiserror::Error;

pub type Result<T, E = MitdsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MitdsError {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error("database error: {0}")]
	Db(#[from] sqlx::Error),

	#[error("migration error: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),

	#[error("serialization error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("dns resolution error: {0}")]
	Dns(#[from] trust_dns_resolver::error::ResolveError),

	#[error("csv error: {0}")]
	Csv(#[from] csv::Error),

	#[error("xml error: {0}")]
	Xml(#[from] quick_xml::Error),

	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),

	#[error("object store error: {0}")]
	Provenance(String),

	#[error("validation error on {field}: {message}")]
	Validation { field: String, message: String },

	#[error("permanent record error: {0}")]
	PermanentRecord(String),

	#[error("merge key conflict: {0}")]
	MergeKeyConflict(String),

	#[error("rate limited, retry after {retry_after_secs}s")]
	RateLimited { retry_after_secs: u64 },

	#[error("trying to send to a disconnected channel")]
	Disconnected,

	#[error("config error: {0}")]
	Config(String),

	#[error("fatal run error: {0}")]
	Fatal(String),
}

impl<T> From<flume::SendError<T>> for MitdsError {
	fn from(_: flume::SendError<T>) -> Self {
		Self::Disconnected
	}
}

impl From<envy::Error> for MitdsError {
	fn from(e: envy::Error) -> Self {
		Self::Config(e.to_string())
	}
}

/// What the (out-of-scope) HTTP layer would actually send back to a
/// caller. No stack traces, ever.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
	pub error_code: String,
	pub error: String,
	pub details: Option<serde_json::Value>,
	pub retry_after: Option<u64>,
}

impl From<&MitdsError> for ErrorResponse {
	fn from(e: &MitdsError) -> Self {
		let (error_code, retry_after) = match e {
			MitdsError::Validation { .. } => ("validation_error", None),
			MitdsError::PermanentRecord(_) => ("permanent_record_error", None),
			MitdsError::MergeKeyConflict(_) => ("merge_key_conflict", None),
			MitdsError::RateLimited { retry_after_secs } => ("rate_limited", Some(*retry_after_secs)),
			MitdsError::Fatal(_) => ("fatal_error", None),
			_ => ("internal_error", None),
		};
		ErrorResponse { error_code: error_code.to_string(), error: e.to_string(), details: None, retry_after }
	}
}

impl fmt::Display for ErrorResponse {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[{}] {}", self.error_code, self.error)
	}
}
