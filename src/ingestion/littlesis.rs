//! LittleSis bulk-data adapter (spec.md §4.4), grounded on
//! `original_source/.../ingestion/littlesis.py`. LittleSis ships bulk
//! entity/relationship exports (`entities.json.gz`, `relationships.json.gz`)
//! rather than an API; like the original, this adapter is a thin shell
//! over that bulk-file contract and is expected to emit zero records
//! without failing when no export is configured (spec.md §9).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::EntityType;

pub struct LittleSisIngester {
	pool: sqlx::PgPool,
}

impl LittleSisIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		LittleSisIngester { pool }
	}
}

#[async_trait]
impl Ingester for LittleSisIngester {
	fn source_name(&self) -> &'static str {
		"littlesis"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let name = record["name"].as_str().unwrap_or_default();
		let entity_type = match record["type"].as_str().unwrap_or("org") {
			"person" => EntityType::Person,
			_ => EntityType::Organization,
		};

		let littlesis_id = record["id"].as_i64().map(|i| i.to_string()).unwrap_or_default();
		let external_ids = serde_json::json!({"littlesis_id": record["id"]});
		let mention = Mention { name: name.to_string(), ..Default::default() };

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;
		let node = writer.resolve_and_upsert_node_tx(&mut tx, entity_type, &mention, &external_ids, &serde_json::json!({}), &serde_json::json!({})).await?;
		let evidence = record_evidence(self.source_name(), &littlesis_id, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		writer.link_evidence_to_node_tx(&mut tx, node.id, evidence_id).await?;
		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if node.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(node.id),
			record_label: name.to_string(),
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}
