//! SEDAR+ adapter (spec.md §4.4), grounded on
//! `original_source/.../ingestion/sedar.py`. SEDAR+ has no public API;
//! the original ingester supports manual CSV export and direct document
//! URL parsing for Early Warning Reports and Alternative Monthly Reports
//! (Form 62-103F1, >10% ownership disclosures). Like the original, this
//! is a thin, best-effort adapter expected to emit zero records without
//! failing when no manual export is supplied (spec.md §9).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::{EdgeType, EntityType, OwnsAttrs};

pub struct SedarIngester {
	pool: sqlx::PgPool,
}

impl SedarIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		SedarIngester { pool }
	}
}

#[async_trait]
impl Ingester for SedarIngester {
	fn source_name(&self) -> &'static str {
		"sedar"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let owner_name = record["owner_name"].as_str().unwrap_or_default();
		let issuer_name = record["issuer_name"].as_str().unwrap_or_default();
		let ownership_percentage = record["ownership_percentage"].as_f64();
		let form_type = record["form_type"].as_str().unwrap_or("62-103F1").to_string();

		let accession_number = record["accession_number"].as_str().map(str::to_string);

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;
		let owner_mention = Mention { name: owner_name.to_string(), ..Default::default() };
		let issuer_mention = Mention { name: issuer_name.to_string(), ..Default::default() };
		let owner = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &owner_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;
		let issuer = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &issuer_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;

		let attrs = OwnsAttrs { ownership_percentage, share_class: None, filing_accession: accession_number.clone(), form_type: Some(form_type), filing_date: None };
		let merge_key = format!("{}:{}", owner.id, issuer.id);
		let evidence = record_evidence(self.source_name(), accession_number.as_deref().unwrap_or(&merge_key), &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		let edge = writer.upsert_edge_tx(&mut tx, EdgeType::Owns, owner.id, issuer.id, &merge_key, &serde_json::to_value(&attrs)?, &[evidence_id]).await?;
		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if edge.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(owner.id),
			record_label: format!("{} owns {}% of {}", owner_name, ownership_percentage.unwrap_or(0.0), issuer_name),
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}
