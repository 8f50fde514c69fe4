//! Composite scorer (spec.md §4.8), grounded on
//! `original_source/.../detection/composite.py`. Fuses the per-category
//! signals emitted by the funding, infrastructure, and temporal
//! detectors into a single flagged/unflagged verdict with a confidence
//! band.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::{DetectedSignal, SignalCategory};

pub const MIN_SIGNALS_PER_CATEGORY: usize = 2;
pub const MIN_CATEGORIES: usize = 2;
pub const CORRELATION_BOOST_PER_CATEGORY: f64 = 0.05;
pub const MAX_CORRELATION_BOOST: f64 = 0.10;
pub const FLAG_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct CompositeScoreResult {
	pub entity_ids: Vec<Uuid>,
	pub raw_score: f64,
	pub adjusted_score: f64,
	pub confidence_lower: f64,
	pub confidence_upper: f64,
	pub is_flagged: bool,
	pub categories_present: Vec<SignalCategory>,
	pub validation_messages: Vec<String>,
}

#[derive(Default)]
pub struct CompositeScorer;

impl CompositeScorer {
	/// Groups signals by category, aggregates each category's strength as
	/// the strongest `strength * confidence` product observed, combines
	/// categories with their fixed weights, applies a correlation boost
	/// when multiple categories implicate the same entity set, and gates
	/// the final verdict per spec.md §4.8(c)-(d).
	pub fn score(&self, signals: &[DetectedSignal]) -> CompositeScoreResult {
		let mut entity_ids: HashSet<Uuid> = HashSet::new();
		for s in signals {
			entity_ids.extend(s.entity_ids.iter().copied());
		}
		let mut entity_ids: Vec<Uuid> = entity_ids.into_iter().collect();
		entity_ids.sort();

		let mut by_category: HashMap<SignalCategory, Vec<&DetectedSignal>> = HashMap::new();
		for s in signals {
			by_category.entry(s.category).or_default().push(s);
		}

		let mut validation_messages = Vec::new();

		let qualifying_categories: Vec<SignalCategory> = by_category
			.iter()
			.filter(|(_, sigs)| {
				if sigs.len() < MIN_SIGNALS_PER_CATEGORY {
					false
				} else {
					true
				}
			})
			.map(|(cat, _)| *cat)
			.collect();

		for (cat, sigs) in &by_category {
			if sigs.len() < MIN_SIGNALS_PER_CATEGORY {
				validation_messages.push(format!("{:?} category has only {} signal(s), below the minimum of {}", cat, sigs.len(), MIN_SIGNALS_PER_CATEGORY));
			}
		}

		let mut categories_present: Vec<SignalCategory> = by_category.keys().copied().collect();
		categories_present.sort_by_key(|c| format!("{:?}", c));

		let mut raw_score = 0.0;
		for (cat, sigs) in &by_category {
			let best = sigs.iter().map(|s| s.strength * s.confidence).fold(0.0_f64, f64::max);
			raw_score += best * cat.weight();
		}

		let boost = if categories_present.len() > 1 { ((categories_present.len() - 1) as f64 * CORRELATION_BOOST_PER_CATEGORY).min(MAX_CORRELATION_BOOST) } else { 0.0 };
		let adjusted_score = (raw_score * (1.0 + boost)).min(1.0);

		let is_flagged = qualifying_categories.len() >= 1 && categories_present.len() >= MIN_CATEGORIES && adjusted_score > FLAG_THRESHOLD;

		if categories_present.len() < MIN_CATEGORIES {
			validation_messages.push(format!("Only {} distinct signal categor{} present, need at least {}", categories_present.len(), if categories_present.len() == 1 { "y" } else { "ies" }, MIN_CATEGORIES));
		}
		if qualifying_categories.is_empty() {
			validation_messages.push("No category has enough signals to qualify for flagging".to_string());
		}

		let all_confidences: Vec<f64> = signals.iter().map(|s| s.confidence).collect();
		let (confidence_lower, confidence_upper) = if all_confidences.is_empty() {
			(0.0, 0.0)
		} else {
			let min_conf = all_confidences.iter().cloned().fold(1.0_f64, f64::min);
			let max_conf = all_confidences.iter().cloned().fold(0.0_f64, f64::max);
			(adjusted_score * min_conf, (adjusted_score * max_conf + 0.1).min(1.0))
		};

		CompositeScoreResult { entity_ids, raw_score, adjusted_score, confidence_lower, confidence_upper, is_flagged, categories_present, validation_messages }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn signal(category: SignalCategory, strength: f64, confidence: f64, entity_ids: Vec<Uuid>) -> DetectedSignal {
		DetectedSignal { signal_type: "test".to_string(), category, strength, confidence, entity_ids }
	}

	#[test]
	fn single_category_never_flags_regardless_of_score() {
		let e = Uuid::new_v4();
		let signals = vec![signal(SignalCategory::Funding, 1.0, 1.0, vec![e]), signal(SignalCategory::Funding, 1.0, 1.0, vec![e])];
		let result = CompositeScorer.score(&signals);
		assert!(!result.is_flagged);
		assert_eq!(result.categories_present.len(), 1);
	}

	#[test]
	fn two_categories_with_enough_signals_can_flag() {
		let e = Uuid::new_v4();
		let signals = vec![
			signal(SignalCategory::Funding, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Funding, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Infrastructure, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Infrastructure, 1.0, 1.0, vec![e]),
		];
		let result = CompositeScorer.score(&signals);
		assert!(result.is_flagged);
		assert_eq!(result.categories_present.len(), 2);
	}

	#[test]
	fn correlation_boost_is_capped_at_ten_percent() {
		let e = Uuid::new_v4();
		let signals = vec![
			signal(SignalCategory::Funding, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Funding, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Infrastructure, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Infrastructure, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Temporal, 1.0, 1.0, vec![e]),
			signal(SignalCategory::Temporal, 1.0, 1.0, vec![e]),
		];
		let result = CompositeScorer.score(&signals);
		assert!(result.adjusted_score <= result.raw_score * 1.10 + 1e-9);
	}

	#[test]
	fn empty_signals_yield_zero_score_and_no_flag() {
		let result = CompositeScorer.score(&[]);
		assert_eq!(result.raw_score, 0.0);
		assert!(!result.is_flagged);
		assert!(!result.validation_messages.is_empty());
	}

	#[test]
	fn single_signal_in_one_category_is_flagged_as_insufficient() {
		let e = Uuid::new_v4();
		let signals = vec![signal(SignalCategory::Funding, 1.0, 1.0, vec![e])];
		let result = CompositeScorer.score(&signals);
		assert!(result.validation_messages.iter().any(|m| m.contains("below the minimum")));
	}
}
