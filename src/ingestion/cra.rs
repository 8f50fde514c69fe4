//! CRA charities adapter (spec.md §4.4). Grounded on
//! `original_source/.../ingestion/cra.py`'s BN validation/normalization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::{MitdsError, Result};
use crate::resolver::Mention;
use crate::types::EntityType;

/// CRA Business Number format: 9 digits, "RR", 4-digit program account.
static BN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}RR\d{4}$").unwrap());

pub fn normalize_bn(raw: &str) -> Option<String> {
	let digits_and_rr: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_uppercase();
	if BN_RE.is_match(&digits_and_rr) {
		Some(digits_and_rr)
	} else {
		None
	}
}

pub struct CraIngester {
	pool: sqlx::PgPool,
}

impl CraIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		CraIngester { pool }
	}
}

#[async_trait]
impl Ingester for CraIngester {
	fn source_name(&self) -> &'static str {
		"cra"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let raw_bn = record["bn"].as_str().unwrap_or_default();
		let bn = normalize_bn(raw_bn).ok_or_else(|| MitdsError::Validation { field: "bn".to_string(), message: format!("invalid BN: {}", raw_bn) })?;

		let name = record["name"].as_str().unwrap_or_default().to_string();
		let external_ids = serde_json::json!({"bn": bn});
		let properties = serde_json::json!({"org_type": "nonprofit", "jurisdiction": "CA"});
		let mention = Mention { name: name.clone(), bn: Some(bn.clone()), jurisdiction: Some("CA".to_string()), ..Default::default() };

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;
		let node = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &mention, &external_ids, &serde_json::json!({}), &properties).await?;
		let evidence = record_evidence(self.source_name(), &bn, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		writer.link_evidence_to_node_tx(&mut tx, node.id, evidence_id).await?;

		if let Some(grant) = record.get("grant") {
			let recipient_bn = grant["recipient_bn"].as_str().and_then(normalize_bn);
			if let Some(recipient_bn) = recipient_bn {
				let recipient_name = grant["recipient_name"].as_str().unwrap_or_default().to_string();
				let recipient_mention = Mention { name: recipient_name.clone(), bn: Some(recipient_bn.clone()), jurisdiction: Some("CA".to_string()), ..Default::default() };
				let recipient = writer
					.resolve_and_upsert_node_tx(
						&mut tx,
						EntityType::Organization,
						&recipient_mention,
						&serde_json::json!({"bn": recipient_bn}),
						&serde_json::json!({}),
						&serde_json::json!({}),
					)
					.await?;
				writer.link_evidence_to_node_tx(&mut tx, recipient.id, evidence_id).await?;

				let fiscal_year = grant["fiscal_year"].as_i64().unwrap_or(0);
				let attrs = crate::types::FundedByAttrs {
					amount: grant["amount"].as_f64().unwrap_or(0.0),
					currency: "CAD".to_string(),
					fiscal_year: fiscal_year as i32,
					grant_purpose: grant["purpose"].as_str().map(str::to_string),
				};
				let merge_key = format!("{}:{}:{}", recipient.id, node.id, fiscal_year);
				writer
					.upsert_edge_tx(&mut tx, crate::types::EdgeType::FundedBy, recipient.id, node.id, &merge_key, &serde_json::to_value(&attrs)?, &[evidence_id])
					.await?;
			}
		}

		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if node.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(node.id),
			record_label: name,
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_well_formed_bn() {
		assert_eq!(normalize_bn("123456789RR0001"), Some("123456789RR0001".to_string()));
	}

	#[test]
	fn strips_separators_before_validating() {
		assert_eq!(normalize_bn("123 456 789 RR 0001"), Some("123456789RR0001".to_string()));
	}

	#[test]
	fn rejects_malformed_bn() {
		assert_eq!(normalize_bn("12345RR0001"), None);
		assert_eq!(normalize_bn("123456789RC0001"), None);
	}
}
