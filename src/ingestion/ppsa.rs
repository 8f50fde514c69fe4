//! Personal Property Security Act registry adapter (spec.md §4.4),
//! grounded on `original_source/.../ingestion/ppsa.py`. Parses secured
//! interest registrations (debtor/creditor pairs) and links them with
//! SECURED_BY. Debtors are matched first by Canada Corps registration
//! number, falling back to name lookup, since PPSA filings carry the
//! corporation number when the debtor is incorporated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::{EdgeType, EntityType, SecuredByAttrs};

pub struct PpsaIngester {
	pool: sqlx::PgPool,
}

impl PpsaIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		PpsaIngester { pool }
	}

	async fn find_debtor(&self, debtor_name: &str, registration_number: Option<&str>) -> Result<Option<uuid::Uuid>> {
		if let Some(reg_num) = registration_number {
			if let Some(id) = crate::database::queries::find_by_external_id(&self.pool, "canada_corp_num", reg_num).await? {
				return Ok(Some(id));
			}
		}
		let normalized = crate::resolver::normalize_name(debtor_name);
		let row = sqlx::query!("SELECT id FROM entities WHERE normalized_name = $1 LIMIT 1", normalized).fetch_optional(&self.pool).await?;
		Ok(row.map(|r| r.id))
	}
}

#[async_trait]
impl Ingester for PpsaIngester {
	fn source_name(&self) -> &'static str {
		"ppsa"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let debtor_name = record["debtor_name"].as_str().unwrap_or_default();
		let debtor_reg_num = record["debtor_registration_number"].as_str();
		let creditor_name = record["creditor_name"].as_str().unwrap_or_default();
		let registration_number = record["registration_number"].as_str().unwrap_or_default().to_string();
		let instrument_type = record["instrument_type"].as_str().unwrap_or("security agreement").to_string();

		let debtor_id = self.find_debtor(debtor_name, debtor_reg_num).await?;
		let debtor_id = match debtor_id {
			Some(id) => id,
			None => return Ok(ProcessResult { outcome: ProcessOutcome::Duplicate, entity_id: None, record_label: format!("unresolved debtor {}", debtor_name) }),
		};

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;
		let mention = Mention { name: creditor_name.to_string(), ..Default::default() };
		let creditor = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;

		let attrs = SecuredByAttrs { instrument_type, registration_number: registration_number.clone() };
		let evidence = record_evidence(self.source_name(), &registration_number, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		let edge = writer.upsert_edge_tx(&mut tx, EdgeType::SecuredBy, debtor_id, creditor.id, &registration_number, &serde_json::to_value(&attrs)?, &[evidence_id]).await?;
		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if edge.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(debtor_id),
			record_label: format!("{} secured by {}", debtor_name, creditor_name),
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}
