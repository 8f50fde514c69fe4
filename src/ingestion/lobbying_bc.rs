//! British Columbia lobbying registry adapter (spec.md §4.4), grounded on
//! `original_source/.../ingestion/lobbying_bc.py`. Unlike the federal
//! registry, BC's source data labels registration type with free-text
//! ("consultant" / "in-house...") rather than numeric codes, so the type
//! is determined by substring match rather than exact lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use super::lobbying::RegistrationType;
use super::{record_evidence, IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::resolver::Mention;
use crate::types::{EdgeType, EntityType, LobbiesForAttrs};

/// BC's source labels registration type as free text; normalize via
/// substring match the way the original ingester does.
pub fn bc_registration_type(raw: &str) -> Option<RegistrationType> {
	let lower = raw.to_lowercase();
	if lower.contains("consultant") {
		Some(RegistrationType::Consultant)
	} else if lower.contains("in-house") || lower.contains("inhouse") {
		Some(RegistrationType::InHouse)
	} else {
		None
	}
}

pub struct LobbyingBcIngester {
	pool: sqlx::PgPool,
}

impl LobbyingBcIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		LobbyingBcIngester { pool }
	}
}

#[async_trait]
impl Ingester for LobbyingBcIngester {
	fn source_name(&self) -> &'static str {
		"lobbying_bc"
	}

	fn fetch_records<'a>(&'a self, _config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		stream::empty().boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let registration_id = record["registration_id"].as_str().unwrap_or_default().to_string();
		let reg_type_raw = record["registration_type"].as_str().unwrap_or_default();
		let reg_type = bc_registration_type(reg_type_raw);

		// For consultants the lobbying entity is the client; for in-house
		// registrants the organization lobbying is itself the registrant.
		let (lobbyist_name, client_org_name) = match reg_type {
			Some(RegistrationType::Consultant) => (record["lobbyist_name"].as_str().unwrap_or_default(), record["client_name"].as_str().unwrap_or_default()),
			_ => (record["lobbyist_name"].as_str().unwrap_or_default(), record["registrant_name"].as_str().unwrap_or_default()),
		};
		let government_institution = record["institution"].as_str().unwrap_or("Government of British Columbia");
		let subject_matters: Vec<String> = record["subject_matters"].as_array().map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default();

		let writer = crate::graph::GraphWriter::new(self.pool.clone());
		let mut tx = writer.begin().await?;

		let lobbyist_mention = Mention { name: lobbyist_name.to_string(), ..Default::default() };
		let client_mention = Mention { name: client_org_name.to_string(), jurisdiction: Some("CA".to_string()), ..Default::default() };

		let lobbyist = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Person, &lobbyist_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;
		let client_org = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &client_mention, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;
		let government = writer.upsert_node_tx(&mut tx, EntityType::Government, government_institution, &serde_json::json!({}), &serde_json::json!({}), &serde_json::json!({})).await?;

		let attrs = LobbiesForAttrs { registration_id: registration_id.clone(), subject_matters, jurisdiction: "CA-BC".to_string() };
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
	fn consultant_freetext_matches() {
		assert_eq!(bc_registration_type("Consultant Lobbyist"), Some(RegistrationType::Consultant));
	}

	#[test]
	fn in_house_variants_match() {
		assert_eq!(bc_registration_type("In-House Organization"), Some(RegistrationType::InHouse));
		assert_eq!(bc_registration_type("inhouse corporation"), Some(RegistrationType::InHouse));
	}

	#[test]
	fn unrecognized_text_is_none() {
		assert_eq!(bc_registration_type("unknown"), None);
	}
}
