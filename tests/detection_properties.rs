//! Testable properties and end-to-end scenarios from spec.md §8 that
//! exercise only the pure detection/resolver logic (no database
//! required): T5-T9 and scenarios S4-S6.

use chrono::{Duration, TimeZone, Utc};
use mitds::detection::composite::CompositeScorer;
use mitds::detection::infra::{AnalyticsResult, InfrastructureProfile, InfrastructureScorer};
use mitds::detection::temporal::{BurstDetector, SynchronizationScorer, TimingEvent};
use mitds::detection::{DetectedSignal, SignalCategory};
use mitds::resolver::normalize_name;
use uuid::Uuid;

/// T5: the infrastructure scorer is symmetric — comparing (A, B) yields
/// the same total score and signal set as comparing (B, A).
#[test]
fn t5_infrastructure_scorer_is_symmetric() {
	let mut a = InfrastructureProfile { domain: "a.example".to_string(), ..Default::default() };
	let mut b = InfrastructureProfile { domain: "b.example".to_string(), ..Default::default() };
	a.analytics = Some(AnalyticsResult { google_analytics_ids: vec!["UA-12345-6".to_string()], adsense_ids: vec!["ca-pub-1234567890123456".to_string()], ..Default::default() });
	b.analytics = Some(AnalyticsResult { google_analytics_ids: vec!["UA-12345-6".to_string()], adsense_ids: vec!["ca-pub-1234567890123456".to_string()], ..Default::default() });

	let ab = InfrastructureScorer::compare(&a, &b);
	let ba = InfrastructureScorer::compare(&b, &a);

	assert_eq!(ab.total_score, ba.total_score);
	assert_eq!(ab.signals.len(), ba.signals.len());
}

/// T6: normalize_name is idempotent for any input.
#[test]
fn t6_normalize_name_is_idempotent() {
	for name in ["Acme Foundation, Inc.", "ACME FOUNDATION", "Some Super PAC", "already normal"] {
		let once = normalize_name(name);
		let twice = normalize_name(&once);
		assert_eq!(once, twice, "normalize_name not idempotent for {:?}", name);
	}
}

/// T7: the burst detector on an empty or one-event stream returns zero
/// bursts and does not panic.
#[test]
fn t7_burst_detector_handles_empty_and_single_event_streams() {
	let id = Uuid::new_v4();
	let detector = BurstDetector::default();

	let empty = detector.detect_bursts(id, &[]);
	assert!(empty.bursts.is_empty());

	let one = vec![TimingEvent { entity_id: id, timestamp: Utc.timestamp_opt(0, 0).unwrap(), event_type: "publication".to_string() }];
	let single = detector.detect_bursts(id, &one);
	assert!(single.bursts.is_empty());
}

/// T8: Jensen-Shannon divergence is >= 0 and ~0 for identical
/// distributions after epsilon smoothing.
#[test]
fn t8_js_divergence_is_nonnegative_and_zero_for_identical_distributions() {
	let scorer = SynchronizationScorer::default();
	let base_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
	let entity_a = Uuid::new_v4();
	let entity_b = Uuid::new_v4();

	let mut events = Vec::new();
	for hour in [1, 1, 1, 1, 1, 13, 13, 13, 13, 13] {
		events.push(TimingEvent { entity_id: entity_a, timestamp: base_time + Duration::hours(hour), event_type: "publication".to_string() });
		events.push(TimingEvent { entity_id: entity_b, timestamp: base_time + Duration::hours(hour), event_type: "publication".to_string() });
	}

	let result = scorer.score_group(&events, &[entity_a, entity_b]).expect("both entities have enough events");
	assert!(result.js_divergence >= 0.0);
	assert!(result.js_divergence < 1e-6, "identical distributions should have ~0 divergence, got {}", result.js_divergence);
}

/// T9 / S6: signals confined to a single category never flag, regardless
/// of strength, and the validation message names the requirement.
#[test]
fn t9_s6_single_category_signals_never_flag() {
	let entity = Uuid::new_v4();
	let signals = vec![
		DetectedSignal { signal_type: "lead_lag".to_string(), category: SignalCategory::Temporal, strength: 0.9, confidence: 1.0, entity_ids: vec![entity] },
		DetectedSignal { signal_type: "burst".to_string(), category: SignalCategory::Temporal, strength: 0.8, confidence: 1.0, entity_ids: vec![entity] },
	];

	let result = CompositeScorer.score(&signals);

	assert!(!result.is_flagged);
	assert!(result.validation_messages.iter().any(|m| m.contains("at least") && m.contains("2")), "expected a message about needing at least two categories, got {:?}", result.validation_messages);
}

/// S4: two domains sharing Google Analytics, AdSense, and an IP score
/// 3.0 + 4.0 + 5.0 = 12.0 total, confidence 1.0, category "analytics".
#[test]
fn s4_shared_analytics_adsense_and_ip_scores_twelve() {
	use mitds::detection::infra::DnsResult;

	let mut a = InfrastructureProfile { domain: "outlet-a.example".to_string(), ..Default::default() };
	let mut b = InfrastructureProfile { domain: "outlet-b.example".to_string(), ..Default::default() };

	a.analytics = Some(AnalyticsResult { google_analytics_ids: vec!["UA-12345-6".to_string()], adsense_ids: vec!["ca-pub-1234567890123456".to_string()], ..Default::default() });
	b.analytics = Some(AnalyticsResult { google_analytics_ids: vec!["UA-12345-6".to_string()], adsense_ids: vec!["ca-pub-1234567890123456".to_string()], ..Default::default() });

	a.dns = Some(DnsResult { a_records: vec!["13.50.1.1".to_string()], ..Default::default() });
	b.dns = Some(DnsResult { a_records: vec!["13.50.1.1".to_string()], ..Default::default() });

	let result = InfrastructureScorer::compare(&a, &b);

	assert_eq!(result.total_score, 12.0);
	assert_eq!(result.confidence(), 1.0);
	assert_eq!(result.sharing_category().as_deref(), Some("analytics"));
}

/// S5: 10 events at 1-minute intervals followed by 10 events at 1-hour
/// intervals — a burst is detected within the first block with level >= 1
/// and event_count >= 3; the second (hourly) block is not bursty.
///
/// Ignored: `BurstDetector::viterbi`'s state rates are a verbatim port of
/// `temporal.py`'s `rates[j] = base_rate * s^j`, which makes emission cost
/// monotonically increasing in state for every gap length in mixed-density
/// streams like this one, so the automaton never leaves state 0 and no
/// burst is ever reported. See DESIGN.md Open Question 4 — this is a
/// documented conflict between spec.md §6 (verbatim port) and this
/// scenario, not a bug fixed by re-deriving the formula again.
#[test]
#[ignore = "known §6/S5 conflict, see DESIGN.md Open Question 4"]
fn s5_tight_minute_interval_block_bursts_hourly_block_does_not() {
	let detector = BurstDetector::default();
	let base_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
	let entity = Uuid::new_v4();

	let mut events: Vec<TimingEvent> = (0..10).map(|i| TimingEvent { entity_id: entity, timestamp: base_time + Duration::minutes(i), event_type: "publication".to_string() }).collect();
	let second_block_start = base_time + Duration::minutes(9);
	events.extend((1..=10).map(|i| TimingEvent { entity_id: entity, timestamp: second_block_start + Duration::hours(i), event_type: "publication".to_string() }));

	let result = detector.detect_bursts(entity, &events);
	let first_block_end = base_time + Duration::minutes(9);
	let second_block_start_time = second_block_start + Duration::hours(1);

	assert!(
		result.bursts.iter().any(|b| b.level >= 1 && b.event_count >= 3 && b.start_time <= first_block_end),
		"expected a burst within the minute-interval block, got {:?}",
		result.bursts
	);
	assert!(!result.bursts.iter().any(|b| b.start_time >= second_block_start_time), "hourly-interval events should not be flagged as a burst");
}
