//! Core data model: entities, relationships, evidence, ingestion runs.
//!
//! Type-specific fields live in a `properties` jsonb bag rather than as a
//! Rust sum type per entity/edge variant, the way substrate-archive's own
//! `StorageModel` stores opaque changesets in a `jsonb` column. Typed
//! accessor structs below are the construction-time views adapters use.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
	Organization,
	Person,
	Outlet,
	Sponsor,
	Ad,
	Government,
	Vendor,
	Domain,
}

impl EntityType {
	pub fn as_str(&self) -> &'static str {
		match self {
			EntityType::Organization => "organization",
			EntityType::Person => "person",
			EntityType::Outlet => "outlet",
			EntityType::Sponsor => "sponsor",
			EntityType::Ad => "ad",
			EntityType::Government => "government",
			EntityType::Vendor => "vendor",
			EntityType::Domain => "domain",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
	FundedBy,
	DirectorOf,
	EmployedBy,
	Owns,
	SponsoredBy,
	SharedInfra,
	LobbiesFor,
	Lobbied,
	BeneficialOwnerOf,
	ContributedTo,
	RegisteredFor,
	AdvertisedOn,
	LitigatedWith,
	SecuredBy,
}

impl EdgeType {
	pub fn as_str(&self) -> &'static str {
		match self {
			EdgeType::FundedBy => "FUNDED_BY",
			EdgeType::DirectorOf => "DIRECTOR_OF",
			EdgeType::EmployedBy => "EMPLOYED_BY",
			EdgeType::Owns => "OWNS",
			EdgeType::SponsoredBy => "SPONSORED_BY",
			EdgeType::SharedInfra => "SHARED_INFRA",
			EdgeType::LobbiesFor => "LOBBIES_FOR",
			EdgeType::Lobbied => "LOBBIED",
			EdgeType::BeneficialOwnerOf => "BENEFICIAL_OWNER_OF",
			EdgeType::ContributedTo => "CONTRIBUTED_TO",
			EdgeType::RegisteredFor => "REGISTERED_FOR",
			EdgeType::AdvertisedOn => "ADVERTISED_ON",
			EdgeType::LitigatedWith => "LITIGATED_WITH",
			EdgeType::SecuredBy => "SECURED_BY",
		}
	}

	/// Is this edge type's semantics undirected? Only SHARED_INFRA today
	/// (spec §3/§4.2); the graph writer must treat (a, b) and (b, a) as
	/// the same edge for these types.
	pub fn is_undirected(&self) -> bool {
		matches!(self, EdgeType::SharedInfra)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
	pub street: Option<String>,
	pub city: Option<String>,
	pub state_province: Option<String>,
	pub postal_code: Option<String>,
	pub country: Option<String>,
}

/// A node in the influence graph. `properties` carries type-specific
/// attributes not promoted to a named column (design note in
/// SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
	pub id: Uuid,
	pub entity_type: EntityType,
	pub name: String,
	pub confidence: f64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub external_ids: HashMap<String, String>,
	pub address: Option<Address>,
	pub properties: serde_json::Value,
}

/// A typed, temporal, evidence-linked edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
	pub id: Uuid,
	pub edge_type: EdgeType,
	pub source_id: Uuid,
	pub target_id: Uuid,
	pub valid_from: Option<DateTime<Utc>>,
	pub valid_to: Option<DateTime<Utc>>,
	pub confidence: f64,
	pub evidence_ids: Vec<Uuid>,
	pub properties: serde_json::Value,
}

impl Relationship {
	/// Point-in-time validity per invariant I6: valid at `t` iff
	/// `valid_from <= t <= valid_to`, with nulls treated as open-ended.
	pub fn valid_at(&self, t: DateTime<Utc>) -> bool {
		let after_start = self.valid_from.map_or(true, |from| from <= t);
		let before_end = self.valid_to.map_or(true, |to| t <= to);
		after_start && before_end
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
	pub id: Uuid,
	pub evidence_type: String,
	pub source_url: Option<String>,
	pub retrieved_at: DateTime<Utc>,
	pub extractor_name: String,
	pub extractor_version: String,
	pub raw_data_key: String,
	pub content_hash: String,
	pub extraction_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	Running,
	Completed,
	Partial,
	Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
	pub id: Uuid,
	pub source: String,
	pub status: RunStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub records_processed: u64,
	pub records_created: u64,
	pub records_updated: u64,
	pub duplicates_found: u64,
	pub errors: Vec<serde_json::Value>,
	pub log_output: String,
}

impl IngestionRun {
	pub fn duration_seconds(&self) -> Option<f64> {
		self.completed_at.map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
	}
}

// --- Relationship-specific attribute structs (SPEC_FULL.md §3) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundedByAttrs {
	pub amount: f64,
	pub currency: String,
	pub fiscal_year: i32,
	pub grant_purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorOfAttrs {
	pub title: String,
	pub compensation: Option<f64>,
	pub hours_per_week: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnsAttrs {
	pub ownership_percentage: Option<f64>,
	pub share_class: Option<String>,
	pub filing_accession: Option<String>,
	pub form_type: Option<String>,
	pub filing_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsoredByAttrs {
	pub spend_lower: Option<f64>,
	pub spend_upper: Option<f64>,
	pub currency: String,
	pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraSignal {
	pub signal_type: String,
	pub value: String,
	pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedInfraAttrs {
	pub signals: Vec<InfraSignal>,
	pub total_score: f64,
	pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbiesForAttrs {
	pub registration_id: String,
	pub subject_matters: Vec<String>,
	pub jurisdiction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneficialOwnerOfAttrs {
	pub control_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributedToAttrs {
	pub amount: f64,
	pub contributor_class: String,
	pub jurisdiction: String,
	pub date_received: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LitigatedWithAttrs {
	pub case_reference: String,
	pub jurisdiction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuredByAttrs {
	pub instrument_type: String,
	pub registration_number: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ts(s: &str) -> DateTime<Utc> {
		s.parse().unwrap()
	}

	#[test]
	fn point_in_time_bounds() {
		let rel = Relationship {
			id: Uuid::new_v4(),
			edge_type: EdgeType::FundedBy,
			source_id: Uuid::new_v4(),
			target_id: Uuid::new_v4(),
			valid_from: Some(ts("2023-01-01T00:00:00Z")),
			valid_to: Some(ts("2023-12-31T00:00:00Z")),
			confidence: 1.0,
			evidence_ids: vec![],
			properties: serde_json::json!({}),
		};
		assert!(!rel.valid_at(ts("2022-12-31T00:00:00Z")));
		assert!(rel.valid_at(ts("2023-06-01T00:00:00Z")));
		assert!(!rel.valid_at(ts("2024-01-01T00:00:00Z")));
	}

	#[test]
	fn open_ended_valid_to_is_current() {
		let rel = Relationship {
			id: Uuid::new_v4(),
			edge_type: EdgeType::DirectorOf,
			source_id: Uuid::new_v4(),
			target_id: Uuid::new_v4(),
			valid_from: Some(ts("2020-01-01T00:00:00Z")),
			valid_to: None,
			confidence: 1.0,
			evidence_ids: vec![],
			properties: serde_json::json!({}),
		};
		assert!(rel.valid_at(ts("2030-01-01T00:00:00Z")));
	}
}
