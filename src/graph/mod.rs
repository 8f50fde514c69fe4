//! Graph writer: idempotent upsert of typed nodes and edges
//! (SPEC_FULL.md §4.2, spec.md §4.2).
//!
//! Grounded on substrate-archive's `database.rs::Insert` trait pattern
//! (`INSERT ... ON CONFLICT ... DO UPDATE`, never overwriting
//! `created_at`) and on `original_source/.../graph/builder.py`'s
//! check-then-merge idempotent upsert shape.

pub mod merge_keys;

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{EdgeType, EntityType};

#[derive(Debug, Clone)]
pub struct NodeResult {
	pub id: Uuid,
	pub entity_type: EntityType,
	pub created: bool,
}

#[derive(Debug, Clone)]
pub struct EdgeResult {
	pub id: Uuid,
	pub edge_type: EdgeType,
	pub source_id: Uuid,
	pub target_id: Uuid,
	pub created: bool,
}

pub struct GraphWriter {
	pool: PgPool,
}

impl GraphWriter {
	pub fn new(pool: PgPool) -> Self {
		GraphWriter { pool }
	}

	/// Upsert a node by its type's merge key. Uses Postgres's
	/// `(xmax = 0)` idiom to report whether the row was just inserted,
	/// the same "report created vs. updated from one statement" contract
	/// as substrate-archive's `Insert::insert` and `graph/builder.py`'s
	/// `NodeResult.created`.
	pub async fn upsert_node(
		&self,
		entity_type: EntityType,
		name: &str,
		external_ids: &serde_json::Value,
		address: &serde_json::Value,
		properties: &serde_json::Value,
	) -> Result<NodeResult> {
		let mut tx = self.pool.begin().await?;
		let result = self.upsert_node_tx(&mut tx, entity_type, name, external_ids, address, properties).await?;
		tx.commit().await?;
		Ok(result)
	}

	/// Open a transaction an adapter threads through a node upsert, an
	/// edge upsert, and an evidence insert so the three commit or roll
	/// back together (spec.md §4.2's "transactional per record").
	pub async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
		Ok(self.pool.begin().await?)
	}

	/// Resolve `mention` against existing nodes before writing. An
	/// auto-merge candidate is merged into by id; a review candidate is
	/// logged to `review_queue` and the record still lands under its own
	/// merge key; anything else falls through to the ordinary upsert.
	pub async fn resolve_and_upsert_node_tx(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		entity_type: EntityType,
		mention: &crate::resolver::Mention,
		external_ids: &serde_json::Value,
		address: &serde_json::Value,
		properties: &serde_json::Value,
	) -> Result<NodeResult> {
		let resolver = crate::resolver::Resolver::new(self.pool.clone());
		let candidates = resolver.resolve(mention).await?;
		if let Some(top) = candidates.first() {
			match top.decision {
				crate::resolver::Decision::AutoMerge => {
					return self.merge_into_node_tx(tx, top.entity_id, entity_type, external_ids, address, properties).await;
				}
				crate::resolver::Decision::Review => {
					self.insert_review_candidate_tx(tx, &mention.name, entity_type, top.entity_id, top.confidence).await?;
				}
				crate::resolver::Decision::Discard => {}
			}
		}
		self.upsert_node_tx(tx, entity_type, &mention.name, external_ids, address, properties).await
	}

	/// Merge new attributes into an already-resolved node by id, rather
	/// than by merge key, for when the resolver's fuzzy match found a
	/// node whose merge key wouldn't naturally have matched this record.
	pub async fn merge_into_node_tx(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		entity_id: Uuid,
		entity_type: EntityType,
		external_ids: &serde_json::Value,
		address: &serde_json::Value,
		properties: &serde_json::Value,
	) -> Result<NodeResult> {
		let now = Utc::now();
		sqlx::query!(
			r#"
			UPDATE entities
			SET updated_at = $2,
			    external_ids = entities.external_ids || $3,
			    address = $4,
			    properties = entities.properties || $5
			WHERE id = $1
			"#,
			entity_id,
			now,
			external_ids,
			address,
			properties,
		)
		.execute(&mut **tx)
		.await?;
		Ok(NodeResult { id: entity_id, entity_type, created: false })
	}

	async fn insert_review_candidate_tx(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		candidate_name: &str,
		entity_type: EntityType,
		matched_entity_id: Uuid,
		confidence: f64,
	) -> Result<()> {
		sqlx::query!(
			r#"
			INSERT INTO review_queue (id, candidate_name, entity_type, matched_entity_id, confidence, created_at, resolved)
			VALUES ($1, $2, $3, $4, $5, $6, FALSE)
			"#,
			Uuid::new_v4(),
			candidate_name,
			entity_type.as_str(),
			matched_entity_id,
			confidence,
			Utc::now(),
		)
		.execute(&mut **tx)
		.await?;
		Ok(())
	}

	/// Insert an evidence row inside the caller's transaction, returning
	/// its id for appending to `relationships.evidence_ids`.
	pub async fn record_evidence_tx(&self, tx: &mut Transaction<'_, Postgres>, evidence: &crate::types::Evidence) -> Result<Uuid> {
		sqlx::query!(
			r#"
			INSERT INTO evidence (id, evidence_type, source_url, retrieved_at, extractor_name,
			                       extractor_version, raw_data_key, content_hash, extraction_confidence)
			VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
			"#,
			evidence.id,
			evidence.evidence_type,
			evidence.source_url,
			evidence.retrieved_at,
			evidence.extractor_name,
			evidence.extractor_version,
			evidence.raw_data_key,
			evidence.content_hash,
			evidence.extraction_confidence,
		)
		.execute(&mut **tx)
		.await?;
		Ok(evidence.id)
	}

	/// Links an evidence row to the node it documents, deduplicated the
	/// same way `upsert_edge_tx` appends `relationships.evidence_ids`.
	pub async fn link_evidence_to_node_tx(&self, tx: &mut Transaction<'_, Postgres>, entity_id: Uuid, evidence_id: Uuid) -> Result<()> {
		sqlx::query!(
			r#"
			UPDATE entities
			SET evidence_ids = (SELECT array_agg(DISTINCT x) FROM unnest(evidence_ids || $2) AS x)
			WHERE id = $1
			"#,
			entity_id,
			evidence_id,
		)
		.execute(&mut **tx)
		.await?;
		Ok(())
	}

	pub async fn upsert_node_tx(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		entity_type: EntityType,
		name: &str,
		external_ids: &serde_json::Value,
		address: &serde_json::Value,
		properties: &serde_json::Value,
	) -> Result<NodeResult> {
		let now = Utc::now();
		let merge_key = merge_key_value(external_ids, name);
		let normalized_name = crate::resolver::normalize_name(name);

		let row = sqlx::query!(
			r#"
			INSERT INTO entities (id, entity_type, name, normalized_name, confidence, created_at, updated_at,
			                       external_ids, address, properties, merge_key)
			VALUES ($1, $2, $3, $4, 1.0, $5, $5, $6, $7, $8, $9)
			ON CONFLICT (merge_key) DO UPDATE
			SET updated_at = $5,
			    name = EXCLUDED.name,
			    normalized_name = EXCLUDED.normalized_name,
			    external_ids = entities.external_ids || EXCLUDED.external_ids,
			    address = EXCLUDED.address,
			    properties = entities.properties || EXCLUDED.properties
			RETURNING id, (xmax = 0) AS "created!"
			"#,
			Uuid::new_v4(),
			entity_type.as_str(),
			name,
			normalized_name,
			now,
			external_ids,
			address,
			properties,
			merge_key,
		)
		.fetch_one(&mut *tx)
		.await?;

		Ok(NodeResult { id: row.id, entity_type, created: row.created })
	}

	/// Upsert an edge by its type's merge-key tuple. For undirected
	/// types (SHARED_INFRA) checks both `(source, target)` and
	/// `(target, source)` before inserting, per spec.md §4.2's
	/// bidirectional-match requirement, grounded on
	/// `graph/builder.py::create_shared_infra_relationship`.
	pub async fn upsert_edge(
		&self,
		edge_type: EdgeType,
		source_id: Uuid,
		target_id: Uuid,
		merge_key: &str,
		properties: &serde_json::Value,
	) -> Result<EdgeResult> {
		let mut tx = self.pool.begin().await?;
		let result = self.upsert_edge_tx(&mut tx, edge_type, source_id, target_id, merge_key, properties, &[]).await?;
		tx.commit().await?;
		Ok(result)
	}

	/// Upsert an edge inside the caller's transaction. On conflict,
	/// advances `updated_at` and appends `evidence_ids` (deduplicated)
	/// rather than leaving them at their initial values (spec.md §4.2:
	/// "update mutable fields, set updated_at, append evidence
	/// references"; T2 requires `updated_at` to advance monotonically on
	/// re-ingest even when zero new edges are created).
	pub async fn upsert_edge_tx(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		edge_type: EdgeType,
		source_id: Uuid,
		target_id: Uuid,
		merge_key: &str,
		properties: &serde_json::Value,
		evidence_ids: &[Uuid],
	) -> Result<EdgeResult> {
		let (source_id, target_id) =
			if edge_type.is_undirected() { self.canonicalize_undirected(tx, edge_type, source_id, target_id).await? } else { (source_id, target_id) };

		let now = Utc::now();
		let row = sqlx::query!(
			r#"
			INSERT INTO relationships (id, edge_type, source_id, target_id, valid_from,
			                            confidence, evidence_ids, properties, merge_key, created_at, updated_at)
			VALUES ($1, $2, $3, $4, $5, 1.0, $6, $7, $8, $5, $5)
			ON CONFLICT (edge_type, merge_key) DO UPDATE
			SET properties = relationships.properties || EXCLUDED.properties,
			    updated_at = $5,
			    evidence_ids = (SELECT array_agg(DISTINCT x) FROM unnest(relationships.evidence_ids || EXCLUDED.evidence_ids) AS x)
			RETURNING id, (xmax = 0) AS "created!"
			"#,
			Uuid::new_v4(),
			edge_type.as_str(),
			source_id,
			target_id,
			now,
			evidence_ids,
			properties,
			merge_key,
		)
		.fetch_one(&mut **tx)
		.await?;

		Ok(EdgeResult { id: row.id, edge_type, source_id, target_id, created: row.created })
	}

	async fn canonicalize_undirected(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		edge_type: EdgeType,
		source_id: Uuid,
		target_id: Uuid,
	) -> Result<(Uuid, Uuid)> {
		let existing_reverse = sqlx::query!(
			"SELECT id FROM relationships WHERE edge_type = $1 AND source_id = $2 AND target_id = $3",
			edge_type.as_str(),
			target_id,
			source_id,
		)
		.fetch_optional(&mut *tx)
		.await?;

		if existing_reverse.is_some() {
			Ok((target_id, source_id))
		} else {
			Ok((source_id, target_id))
		}
	}

	/// SHARED_INFRA-specific convenience: derives `sharing_category` from
	/// the strongest signal family (priority order per §4.6) and writes
	/// the edge.
	pub async fn create_shared_infra(
		&self,
		outlet_a: Uuid,
		outlet_b: Uuid,
		signals: &[crate::types::InfraSignal],
		total_score: f64,
	) -> Result<EdgeResult> {
		let category = crate::detection::infra::sharing_category(signals);
		let merge_key = format!("{}:{}", outlet_a.min(outlet_b), outlet_a.max(outlet_b));
		let properties = serde_json::json!({
			"signals": signals,
			"total_score": total_score,
			"sharing_category": category,
		});
		self.upsert_edge(EdgeType::SharedInfra, outlet_a, outlet_b, &merge_key, &properties).await
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}
}

/// Derive the canonical merge-key string for a node from its external
/// identifiers, falling back to name (+ jurisdiction, carried inside the
/// same map for organizations) per the priority table in `merge_keys.rs`.
fn merge_key_value(external_ids: &serde_json::Value, name: &str) -> String {
	const ID_PRIORITY: &[&str] = &["ein", "bn", "sec_cik", "canada_corp_num", "meta_page_id", "irs_990_name", "opencorp_officer_id", "primary_domain"];
	for key in ID_PRIORITY {
		if let Some(v) = external_ids.get(key).and_then(|v| v.as_str()) {
			if !v.is_empty() {
				return format!("{}:{}", key, v);
			}
		}
	}
	let jurisdiction = external_ids.get("jurisdiction").and_then(|v| v.as_str()).unwrap_or("");
	format!("name:{}:{}", name.to_lowercase(), jurisdiction)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merge_key_prefers_identifier_over_name() {
		let ids = serde_json::json!({"ein": "12-3456789"});
		assert_eq!(merge_key_value(&ids, "Acme Foundation"), "ein:12-3456789");
	}

	#[test]
	fn merge_key_falls_back_to_name_and_jurisdiction() {
		let ids = serde_json::json!({"jurisdiction": "US-NY"});
		assert_eq!(merge_key_value(&ids, "Acme Foundation"), "name:acme foundation:US-NY");
	}
}
