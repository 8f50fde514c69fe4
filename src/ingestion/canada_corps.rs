//! Canada Corps (ISED) adapter (spec.md §4.4). Act-code/status-code
//! mapping reproduced verbatim from
//! `original_source/.../ingestion/canada_corps.py`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::EntityType;

/// ISED act code -> org_type, reproduced verbatim.
pub fn act_code_to_org_type(code: &str) -> &'static str {
	match code {
		"6" => "corporation",  // CBCA
		"7" => "nonprofit",    // NFP
		"8" => "nonprofit",    // BOTA
		"9" => "cooperative",  // COOP
		"10" => "nonprofit",   // CNFPA
		_ => "unknown",
	}
}

pub fn act_code_name(code: &str) -> &'static str {
	match code {
		"6" => "CBCA",
		"7" => "NFP",
		"8" => "BOTA",
		"9" => "COOP",
		"10" => "CNFPA",
		_ => "UNKNOWN",
	}
}

/// ISED status code -> node status enum, reproduced verbatim.
pub fn status_code_to_status(code: &str) -> &'static str {
	match code {
		"A" => "active",
		"D" => "inactive",
		"S" => "revoked",
		_ => "unknown",
	}
}

pub struct CanadaCorpsIngester {
	pool: sqlx::PgPool,
}

impl CanadaCorpsIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		CanadaCorpsIngester { pool }
	}
}

#[async_trait]
impl Ingester for CanadaCorpsIngester {
	fn source_name(&self) -> &'static str {
		"canada_corps"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let corp_num = record["corporation_number"].as_str().unwrap_or_default().to_string();
		let name = record["corporation_name"].as_str().unwrap_or_default().to_string();
		let act_code = record["act_code"].as_str().unwrap_or_default();
		let status_code = record["status_code"].as_str().unwrap_or_default();

		let properties = serde_json::json!({
			"org_type": act_code_to_org_type(act_code),
			"status": status_code_to_status(status_code),
			"jurisdiction": "CA",
			"is_canadian": true,
		});
		let external_ids = serde_json::json!({"canada_corp_num": corp_num});
		let mention = Mention { name: name.clone(), canada_corp_num: Some(corp_num.clone()), jurisdiction: Some("CA".to_string()), ..Default::default() };

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;
		let node = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &mention, &external_ids, &serde_json::json!({}), &properties).await?;
		let evidence = record_evidence(self.source_name(), &corp_num, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		writer.link_evidence_to_node_tx(&mut tx, node.id, evidence_id).await?;
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
	fn cbca_maps_to_corporation() {
		assert_eq!(act_code_to_org_type("6"), "corporation");
	}

	#[test]
	fn nfp_and_bota_map_to_nonprofit() {
		assert_eq!(act_code_to_org_type("7"), "nonprofit");
		assert_eq!(act_code_to_org_type("8"), "nonprofit");
	}

	#[test]
	fn coop_maps_to_cooperative() {
		assert_eq!(act_code_to_org_type("9"), "cooperative");
	}

	#[test]
	fn unknown_act_code_maps_to_unknown() {
		assert_eq!(act_code_to_org_type("999"), "unknown");
	}
}
