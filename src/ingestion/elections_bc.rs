//! British Columbia elections contributions adapter (spec.md §4.4): $250
//! minimum, same as federal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::elections_federal::{is_corporate_contributor, CONTRIBUTION_THRESHOLD_CAD};
use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::{ContributedToAttrs, EdgeType, EntityType};

pub struct ElectionsBcIngester {
	pool: sqlx::PgPool,
}

impl ElectionsBcIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		ElectionsBcIngester { pool }
	}
}

#[async_trait]
impl Ingester for ElectionsBcIngester {
	fn source_name(&self) -> &'static str {
		"elections_bc"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let amount = record["amount"].as_f64().unwrap_or(0.0);
		if amount <= CONTRIBUTION_THRESHOLD_CAD {
			return Ok(ProcessResult { outcome: ProcessOutcome::Duplicate, entity_id: None, record_label: "below disclosure threshold".to_string() });
		}

		let contributor_name = record["contributor_name"].as_str().unwrap_or_default();
		let contributor_type = record["contributor_type"].as_str().unwrap_or("individual");
		let recipient_name = record["recipient_party"].as_str().unwrap_or_default();

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;
		let contributor_entity_type = if is_corporate_contributor(contributor_type) { EntityType::Organization } else { EntityType::Person };
		let contributor_mention = Mention { name: contributor_name.to_string(), jurisdiction: Some("CA".to_string()), ..Default::default() };
		let recipient_mention = Mention { name: recipient_name.to_string(), jurisdiction: Some("CA".to_string()), ..Default::default() };
		let contributor = writer.resolve_and_upsert_node_tx(&mut tx, contributor_entity_type, &contributor_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;
		let recipient = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &recipient_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;

		let date_received: DateTime<Utc> = record["date_received"].as_str().and_then(|s| s.parse().ok()).unwrap_or_else(Utc::now);
		let attrs = ContributedToAttrs { amount, contributor_class: contributor_type.to_string(), jurisdiction: "CA-BC".to_string(), date_received };
		let merge_key = format!("{}:{}:{}", contributor.id, recipient.id, date_received.to_rfc3339());
		let evidence = record_evidence(self.source_name(), &merge_key, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		let edge = writer.upsert_edge_tx(&mut tx, EdgeType::ContributedTo, contributor.id, recipient.id, &merge_key, &serde_json::to_value(&attrs)?, &[evidence_id]).await?;
		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if edge.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(contributor.id),
			record_label: contributor_name.to_string(),
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}
