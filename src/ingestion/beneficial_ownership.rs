//! Beneficial ownership (individuals with significant control) adapter
//! (spec.md §4.4), grounded on
//! `original_source/.../ingestion/beneficial_ownership.py`. Canada's
//! "individual with significant control" registers link a person to the
//! corporation they control; modeled here as an OWNS edge since the spec
//! does not carry a separate control edge type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::{EdgeType, EntityType, OwnsAttrs};

pub struct BeneficialOwnershipIngester {
	pool: sqlx::PgPool,
}

impl BeneficialOwnershipIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		BeneficialOwnershipIngester { pool }
	}
}

#[async_trait]
impl Ingester for BeneficialOwnershipIngester {
	fn source_name(&self) -> &'static str {
		"beneficial_ownership"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let owner_name = record["owner_name"].as_str().unwrap_or_default();
		let corporation_number = record["corporation_number"].as_str().unwrap_or_default();
		let control_description = record["control_description"].as_str().map(str::to_string);

		let controlled = crate::database::queries::find_by_external_id(&self.pool, "canada_corp_num", corporation_number).await?;
		let controlled = match controlled {
			Some(id) => id,
			None => return Ok(ProcessResult { outcome: ProcessOutcome::Duplicate, entity_id: None, record_label: format!("unresolved corporation {}", corporation_number) }),
		};

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;

		let mention = Mention { name: owner_name.to_string(), ..Default::default() };
		let owner = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Person, &mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;

		let attrs = OwnsAttrs { ownership_percentage: None, share_class: control_description, filing_accession: None, form_type: Some("significant_control_register".to_string()), filing_date: None };
		let merge_key = format!("{}:{}", owner.id, controlled);
		let evidence = record_evidence(self.source_name(), corporation_number, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		let edge = writer.upsert_edge_tx(&mut tx, EdgeType::Owns, owner.id, controlled, &merge_key, &serde_json::to_value(&attrs)?, &[evidence_id]).await?;
		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if edge.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(owner.id),
			record_label: owner_name.to_string(),
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}
