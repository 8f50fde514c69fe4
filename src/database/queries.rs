//! Hand-written SQL reads used by the detectors and the resolver.
//!
//! Grounded on substrate-archive's `database/queries.rs` (raw `sqlx::query!`
//! reads kept separate from the `Insert`-trait write path in `database.rs`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{EdgeType, EntityType, Relationship};

/// Point-in-time edge lookup per invariant I6: an edge is "valid at t"
/// iff `valid_from <= t <= valid_to`, nulls treated as open.
pub async fn edges_valid_at(
	pool: &PgPool,
	edge_type: EdgeType,
	t: DateTime<Utc>,
) -> Result<Vec<Relationship>> {
	let rows = sqlx::query_as!(
		RelationshipRow,
		r#"
		SELECT id, edge_type, source_id, target_id, valid_from, valid_to,
		       confidence, evidence_ids, properties
		FROM relationships
		WHERE edge_type = $1
		  AND (valid_from IS NULL OR valid_from <= $2)
		  AND (valid_to IS NULL OR valid_to >= $2)
		"#,
		edge_type.as_str(),
		t,
	)
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().map(RelationshipRow::into_relationship).collect())
}

/// All director/employment edges touching a node, for the resolver's
/// shared-director signal (SPEC_FULL.md §4.3).
pub async fn director_and_employment_edges(pool: &PgPool, entity_id: Uuid) -> Result<Vec<Relationship>> {
	let rows = sqlx::query_as!(
		RelationshipRow,
		r#"
		SELECT id, edge_type, source_id, target_id, valid_from, valid_to,
		       confidence, evidence_ids, properties
		FROM relationships
		WHERE (edge_type = 'DIRECTOR_OF' OR edge_type = 'EMPLOYED_BY')
		  AND (source_id = $1 OR target_id = $1)
		"#,
		entity_id,
	)
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().map(RelationshipRow::into_relationship).collect())
}

pub async fn find_by_external_id(pool: &PgPool, key: &str, value: &str) -> Result<Option<Uuid>> {
	let row = sqlx::query!(
		"SELECT id FROM entities WHERE external_ids ->> $1 = $2 LIMIT 1",
		key,
		value,
	)
	.fetch_optional(pool)
	.await?;

	Ok(row.map(|r| r.id))
}

pub async fn entity_type_of(pool: &PgPool, id: Uuid) -> Result<Option<EntityType>> {
	let row = sqlx::query!("SELECT entity_type FROM entities WHERE id = $1", id).fetch_optional(pool).await?;
	Ok(row.and_then(|r| serde_json::from_value(serde_json::Value::String(r.entity_type)).ok()))
}

struct RelationshipRow {
	id: Uuid,
	edge_type: String,
	source_id: Uuid,
	target_id: Uuid,
	valid_from: Option<DateTime<Utc>>,
	valid_to: Option<DateTime<Utc>>,
	confidence: f64,
	evidence_ids: Vec<Uuid>,
	properties: serde_json::Value,
}

impl RelationshipRow {
	fn into_relationship(self) -> Relationship {
		let edge_type = parse_edge_type(&self.edge_type);
		Relationship {
			id: self.id,
			edge_type,
			source_id: self.source_id,
			target_id: self.target_id,
			valid_from: self.valid_from,
			valid_to: self.valid_to,
			confidence: self.confidence,
			evidence_ids: self.evidence_ids,
			properties: self.properties,
		}
	}
}

fn parse_edge_type(s: &str) -> EdgeType {
	match s {
		"FUNDED_BY" => EdgeType::FundedBy,
		"DIRECTOR_OF" => EdgeType::DirectorOf,
		"EMPLOYED_BY" => EdgeType::EmployedBy,
		"OWNS" => EdgeType::Owns,
		"SPONSORED_BY" => EdgeType::SponsoredBy,
		"SHARED_INFRA" => EdgeType::SharedInfra,
		"LOBBIES_FOR" => EdgeType::LobbiesFor,
		"LOBBIED" => EdgeType::Lobbied,
		"BENEFICIAL_OWNER_OF" => EdgeType::BeneficialOwnerOf,
		"CONTRIBUTED_TO" => EdgeType::ContributedTo,
		"REGISTERED_FOR" => EdgeType::RegisteredFor,
		"ADVERTISED_ON" => EdgeType::AdvertisedOn,
		"LITIGATED_WITH" => EdgeType::LitigatedWith,
		"SECURED_BY" => EdgeType::SecuredBy,
		other => panic!("unknown edge type in database: {}", other),
	}
}
