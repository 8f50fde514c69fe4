//! Federal lobbying registry adapter (spec.md §4.4). Registration-type
//! code mapping reproduced verbatim from
//! `original_source/.../ingestion/lobbying.py`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::{EdgeType, EntityType, LobbiesForAttrs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationType {
	Consultant,
	InHouse,
}

/// Registration type code "1" -> consultant, "3" -> in-house, verbatim.
pub fn registration_type(code: &str) -> Option<RegistrationType> {
	match code {
		"1" => Some(RegistrationType::Consultant),
		"3" => Some(RegistrationType::InHouse),
		_ => None,
	}
}

pub struct LobbyingIngester {
	pool: sqlx::PgPool,
}

impl LobbyingIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		LobbyingIngester { pool }
	}
}

#[async_trait]
impl Ingester for LobbyingIngester {
	fn source_name(&self) -> &'static str {
		"lobbying_federal"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let registration_id = record["registration_id"].as_str().unwrap_or_default().to_string();
		let lobbyist_name = record["lobbyist_name"].as_str().unwrap_or_default();
		let client_org_name = record["client_organization"].as_str().unwrap_or_default();
		let government_institution = record["institution"].as_str().unwrap_or_default();
		let subject_matters: Vec<String> = record["subject_matters"].as_array().map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default();

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;

		let lobbyist_mention = Mention { name: lobbyist_name.to_string(), ..Default::default() };
		let client_mention = Mention { name: client_org_name.to_string(), ..Default::default() };

		let lobbyist = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Person, &lobbyist_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;
		let client_org = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &client_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;
		let government = writer.upsert_node_tx(&mut tx, EntityType::Government, government_institution, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;

		let attrs = LobbiesForAttrs { registration_id: registration_id.clone(), subject_matters, jurisdiction: "federal".to_string() };
		let attrs_value = serde_json::to_value(&attrs)?;

		let evidence = record_evidence(self.source_name(), &registration_id, &record)?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;

		writer.upsert_edge_tx(&mut tx, EdgeType::LobbiesFor, lobbyist.id, client_org.id, &registration_id, &attrs_value, &[evidence_id]).await?;
		let edge = writer.upsert_edge_tx(&mut tx, EdgeType::Lobbied, client_org.id, government.id, &registration_id, &attrs_value, &[evidence_id]).await?;
		tx.commit().await?;

		Ok(ProcessResult {
			outcome: if edge.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(client_org.id),
			record_label: format!("{} -> {}", lobbyist_name, government_institution),
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
	fn code_1_is_consultant() {
		assert_eq!(registration_type("1"), Some(RegistrationType::Consultant));
	}

	#[test]
	fn code_3_is_in_house() {
		assert_eq!(registration_type("3"), Some(RegistrationType::InHouse));
	}

	#[test]
	fn unknown_code_is_none() {
		assert_eq!(registration_type("7"), None);
	}
}
