//! Funding-cluster detector (spec.md §4.5), grounded on
//! `original_source/.../detection/funding.py`. Finds recipients that
//! share multiple common funders, unions them into clusters, and scores
//! each cluster; also exposes a "shared funders" view ordered by
//! recipient count then total funding.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

pub const DEFAULT_MIN_SHARED_FUNDERS: usize = 2;
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct FundingClusterResult {
	pub cluster_id: String,
	pub shared_funder_id: Uuid,
	pub shared_funder_name: String,
	pub members: Vec<(Uuid, String)>,
	pub total_funding: f64,
	pub score: f64,
	pub confidence: f64,
	pub evidence_summary: String,
}

#[derive(Debug, Clone)]
pub struct SharedFunderResult {
	pub funder_id: Uuid,
	pub funder_name: String,
	pub recipients: Vec<(Uuid, String)>,
	pub shared_count: usize,
	pub total_funding: f64,
	pub funding_concentration: f64,
	pub years_active: usize,
}

struct UnionFind {
	parent: HashMap<Uuid, Uuid>,
}

impl UnionFind {
	fn new() -> Self {
		UnionFind { parent: HashMap::new() }
	}

	fn find(&mut self, x: Uuid) -> Uuid {
		let p = *self.parent.entry(x).or_insert(x);
		if p == x {
			x
		} else {
			let root = self.find(p);
			self.parent.insert(x, root);
			root
		}
	}

	fn union(&mut self, x: Uuid, y: Uuid) {
		let (px, py) = (self.find(x), self.find(y));
		if px != py {
			self.parent.insert(px, py);
		}
	}
}

struct FundingEdge {
	recipient_id: Uuid,
	recipient_name: String,
	funder_id: Uuid,
	funder_name: String,
	amount: f64,
	fiscal_year: Option<i32>,
}

pub struct FundingClusterDetector {
	pool: PgPool,
	min_shared_funders: usize,
	min_cluster_size: usize,
}

impl FundingClusterDetector {
	pub fn new(pool: PgPool) -> Self {
		FundingClusterDetector { pool, min_shared_funders: DEFAULT_MIN_SHARED_FUNDERS, min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE }
	}

	pub fn with_thresholds(pool: PgPool, min_shared_funders: usize, min_cluster_size: usize) -> Self {
		FundingClusterDetector { pool, min_shared_funders, min_cluster_size }
	}

	async fn fetch_funding_edges(&self, entity_type: Option<&str>, fiscal_year: Option<i32>) -> Result<Vec<FundingEdge>> {
		let rows = sqlx::query!(
			r#"
			SELECT r.source_id as recipient_id, recipient.name as recipient_name,
			       r.target_id as funder_id, funder.name as funder_name,
			       (r.properties ->> 'amount')::float8 as "amount?",
			       (r.properties ->> 'fiscal_year')::int4 as "fiscal_year?"
			FROM relationships r
			JOIN entities recipient ON recipient.id = r.source_id
			JOIN entities funder ON funder.id = r.target_id
			WHERE r.edge_type = 'FUNDED_BY'
			  AND ($1::text IS NULL OR recipient.entity_type = $1)
			  AND ($2::int4 IS NULL OR (r.properties ->> 'fiscal_year')::int4 = $2)
			"#,
			entity_type,
			fiscal_year,
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|r| FundingEdge { recipient_id: r.recipient_id, recipient_name: r.recipient_name, funder_id: r.funder_id, funder_name: r.funder_name, amount: r.amount.unwrap_or(0.0), fiscal_year: r.fiscal_year })
			.collect())
	}

	/// Detect clusters of recipients sharing `min_shared_funders` or more
	/// common funders; score and sort descending, per spec.md §4.5.
	pub async fn detect_clusters(&self, entity_type: Option<&str>, fiscal_year: Option<i32>, limit: usize) -> Result<Vec<FundingClusterResult>> {
		let edges = self.fetch_funding_edges(entity_type, fiscal_year).await?;

		let mut funders_by_recipient: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
		let mut names: HashMap<Uuid, String> = HashMap::new();
		let mut funding_by_recipient: HashMap<Uuid, f64> = HashMap::new();
		for e in &edges {
			funders_by_recipient.entry(e.recipient_id).or_default().insert(e.funder_id);
			names.insert(e.recipient_id, e.recipient_name.clone());
			names.insert(e.funder_id, e.funder_name.clone());
			*funding_by_recipient.entry(e.recipient_id).or_insert(0.0) += e.amount;
		}

		let recipients: Vec<Uuid> = funders_by_recipient.keys().copied().collect();
		let mut uf = UnionFind::new();
		let mut shared_funder_for: HashMap<(Uuid, Uuid), Uuid> = HashMap::new();

		for i in 0..recipients.len() {
			for j in (i + 1)..recipients.len() {
				let (a, b) = (recipients[i], recipients[j]);
				let shared: HashSet<_> = funders_by_recipient[&a].intersection(&funders_by_recipient[&b]).copied().collect();
				if shared.len() >= self.min_shared_funders {
					uf.union(a, b);
					if let Some(f) = shared.iter().next() {
						shared_funder_for.insert((a.min(b), a.max(b)), *f);
					}
				}
			}
		}

		let mut clusters_by_root: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
		for &r in &recipients {
			let root = uf.find(r);
			clusters_by_root.entry(root).or_default().insert(r);
		}

		let mut results = Vec::new();
		let mut cluster_num = 0;
		for (_, member_ids) in clusters_by_root {
			if member_ids.len() < self.min_cluster_size {
				continue;
			}
			cluster_num += 1;
			let members: Vec<Uuid> = member_ids.into_iter().collect();
			let shared_funder_id = members
				.windows(2)
				.find_map(|w| shared_funder_for.get(&(w[0].min(w[1]), w[0].max(w[1]))))
				.copied()
				.or_else(|| funders_by_recipient[&members[0]].iter().next().copied())
				.unwrap();

			let total_funding: f64 = members.iter().map(|m| funding_by_recipient.get(m).copied().unwrap_or(0.0)).sum();
			let score = Self::cluster_score(members.len(), total_funding);
			let confidence = (score + 0.2).min(1.0);
			let member_pairs: Vec<(Uuid, String)> = members.iter().map(|m| (*m, names.get(m).cloned().unwrap_or_default())).collect();
			let evidence_summary = Self::evidence_summary(&member_pairs, names.get(&shared_funder_id).cloned().unwrap_or_default().as_str(), total_funding);

			results.push(FundingClusterResult {
				cluster_id: format!("cluster_{}", cluster_num),
				shared_funder_id,
				shared_funder_name: names.get(&shared_funder_id).cloned().unwrap_or_default(),
				members: member_pairs,
				total_funding,
				score,
				confidence,
				evidence_summary,
			});
		}

		results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
		results.truncate(limit);
		Ok(results)
	}

	/// `0.4*min(|members|/10,1) + (0.3 if total_funding>0 else 0) + 0.3`,
	/// clamped to [0,1], verbatim from spec.md §4.5.
	fn cluster_score(member_count: usize, total_funding: f64) -> f64 {
		let member_score = (member_count as f64 / 10.0).min(1.0) * 0.4;
		let funding_score = if total_funding > 0.0 { 0.3 } else { 0.0 };
		let shared_score = 0.3;
		(member_score + funding_score + shared_score).clamp(0.0, 1.0)
	}

	fn evidence_summary(members: &[(Uuid, String)], funder_name: &str, total_funding: f64) -> String {
		let mut names: Vec<String> = members.iter().take(5).map(|(_, n)| n.clone()).collect();
		if members.len() > 5 {
			names.push(format!("and {} others", members.len() - 5));
		}
		format!("Cluster of {} entities ({}) sharing funding from {}. Total funding: ${:.2}.", members.len(), names.join(", "), funder_name, total_funding)
	}

	/// Funders shared by `min_recipients` or more entities, ordered by
	/// recipient count then total funding, per spec.md §4.5.
	pub async fn find_shared_funders(&self, entity_type: Option<&str>, min_recipients: usize, fiscal_year: Option<i32>, limit: usize) -> Result<Vec<SharedFunderResult>> {
		let edges = self.fetch_funding_edges(entity_type, fiscal_year).await?;

		let mut recipients_by_funder: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
		let mut names: HashMap<Uuid, String> = HashMap::new();
		let mut funding_by_funder_subset: HashMap<Uuid, f64> = HashMap::new();
		let mut funder_total: HashMap<Uuid, f64> = HashMap::new();
		let mut years_by_funder: HashMap<Uuid, HashSet<i32>> = HashMap::new();

		for e in &edges {
			recipients_by_funder.entry(e.funder_id).or_default().insert(e.recipient_id);
			names.insert(e.recipient_id, e.recipient_name.clone());
			names.insert(e.funder_id, e.funder_name.clone());
			*funding_by_funder_subset.entry(e.funder_id).or_insert(0.0) += e.amount;
			*funder_total.entry(e.funder_id).or_insert(0.0) += e.amount;
			if let Some(y) = e.fiscal_year {
				years_by_funder.entry(e.funder_id).or_default().insert(y);
			}
		}

		let mut results: Vec<SharedFunderResult> = recipients_by_funder
			.into_iter()
			.filter(|(_, recipients)| recipients.len() >= min_recipients)
			.map(|(funder_id, recipients)| {
				let shared_count = recipients.len();
				let total_funding = funding_by_funder_subset.get(&funder_id).copied().unwrap_or(0.0);
				let total = funder_total.get(&funder_id).copied().unwrap_or(0.0);
				let funding_concentration = if total > 0.0 { total_funding / total } else { 0.0 };
				SharedFunderResult {
					funder_id,
					funder_name: names.get(&funder_id).cloned().unwrap_or_default(),
					recipients: recipients.into_iter().map(|r| (r, names.get(&r).cloned().unwrap_or_default())).collect(),
					shared_count,
					total_funding,
					funding_concentration,
					years_active: years_by_funder.get(&funder_id).map(|s| s.len()).unwrap_or(0),
				}
			})
			.collect();

		results.sort_by(|a, b| b.shared_count.cmp(&a.shared_count).then(b.total_funding.partial_cmp(&a.total_funding).unwrap()));
		results.truncate(limit);
		Ok(results)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cluster_score_caps_member_contribution_at_ten() {
		let score_at_ten = FundingClusterDetector::cluster_score(10, 100.0);
		let score_at_twenty = FundingClusterDetector::cluster_score(20, 100.0);
		assert_eq!(score_at_ten, score_at_twenty);
		assert_eq!(score_at_ten, 1.0);
	}

	#[test]
	fn cluster_score_without_funding_drops_the_funding_term() {
		let score = FundingClusterDetector::cluster_score(2, 0.0);
		assert!((score - 0.38).abs() < 1e-9);
	}

	#[test]
	fn evidence_summary_truncates_after_five_members() {
		let members: Vec<(Uuid, String)> = (0..7).map(|i| (Uuid::new_v4(), format!("Org{}", i))).collect();
		let summary = FundingClusterDetector::evidence_summary(&members, "Funder X", 1234.5);
		assert!(summary.contains("and 2 others"));
		assert!(summary.contains("Funder X"));
	}
}
