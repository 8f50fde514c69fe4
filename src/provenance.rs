//! Provenance & evidence store (SPEC_FULL.md §4.1).
//!
//! Grounded on `original_source/.../storage.py`'s `StorageClient`
//! (boto3 against MinIO/S3), translated to the `rust-s3` crate, which
//! offers the same "bucket handle, `put`/`get`/presign" shape.

use chrono::{DateTime, Utc};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{MitdsError, Result};

pub struct ProvenanceStore {
	bucket: Bucket,
}

impl ProvenanceStore {
	pub fn new(config: &Config) -> Result<Self> {
		let credentials = Credentials::new(
			Some(&config.object_store_access_key),
			Some(&config.object_store_secret_key),
			None,
			None,
			None,
		)
		.map_err(|e| MitdsError::Provenance(e.to_string()))?;

		let region = s3::Region::Custom {
			region: config.object_store_region.clone(),
			endpoint: config.object_store_endpoint.clone(),
		};

		let bucket = Bucket::new(&config.object_store_bucket, region, credentials)
			.map_err(|e| MitdsError::Provenance(e.to_string()))?
			.with_path_style();

		Ok(ProvenanceStore { bucket })
	}

	/// Store raw bytes under a stable key; returns `(key, sha256_hex)`.
	pub async fn put(&self, source: &str, identifier: &str, extension: &str, data: &[u8], content_type: &str) -> Result<(String, String)> {
		let key = storage_key(source, identifier, extension, None);
		let hash = content_hash(data);

		self.bucket
			.put_object_with_content_type(&key, data, content_type)
			.await
			.map_err(|e| MitdsError::Provenance(e.to_string()))?;

		Ok((key, hash))
	}

	pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
		let (data, _code) = self.bucket.get_object(key).await.map_err(|e| MitdsError::Provenance(e.to_string()))?;
		Ok(data)
	}

	pub async fn exists(&self, key: &str) -> Result<bool> {
		match self.bucket.head_object(key).await {
			Ok(_) => Ok(true),
			Err(e) => {
				let msg = e.to_string();
				if msg.contains("404") {
					Ok(false)
				} else {
					Err(MitdsError::Provenance(msg))
				}
			}
		}
	}

	pub fn presign(&self, key: &str, ttl_secs: u32) -> Result<String> {
		self.bucket.presign_get(key, ttl_secs, None).map_err(|e| MitdsError::Provenance(e.to_string()))
	}
}

/// SHA-256 hex digest of content, grounded on `storage.py::compute_content_hash`.
pub fn content_hash(data: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(data);
	hex::encode(hasher.finalize())
}

/// `{source}/{yyyy-mm}/{sanitized_id}.{ext}`, reproducing
/// `storage.py::generate_storage_key`'s format and sanitization exactly.
pub fn storage_key(source: &str, identifier: &str, extension: &str, timestamp: Option<DateTime<Utc>>) -> String {
	let ts = timestamp.unwrap_or_else(Utc::now);
	let year_month = ts.format("%Y-%m");
	let safe_identifier = identifier.replace('/', "_").replace('\\', "_");
	format!("{}/{}/{}.{}", source, year_month, safe_identifier, extension)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn storage_key_sanitizes_path_separators() {
		let ts = "2024-03-15T00:00:00Z".parse().unwrap();
		let key = storage_key("irs990", "12-3456789/amended\\v2", "xml", Some(ts));
		assert_eq!(key, "irs990/2024-03/12-3456789_amended_v2.xml");
	}

	#[test]
	fn content_hash_is_deterministic_sha256() {
		let h1 = content_hash(b"hello");
		let h2 = content_hash(b"hello");
		assert_eq!(h1, h2);
		assert_eq!(h1, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
	}
}
