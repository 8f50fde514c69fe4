//! Per-run log capture: a bounded ring buffer attached for the duration
//! of one ingestion run, flushed into the run record at completion
//! (spec.md §4.4 O2). Grounded on
//! `original_source/.../ingestion/base.py`'s `start_capture`/
//! `RunLogHandler`/`finish_capture` trio and on substrate-archive's use
//! of `parking_lot::Mutex` for shared mutable state.

use std::collections::VecDeque;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

const MAX_LINES: usize = 5000;
const TRUNCATION_SENTINEL: &str = "... [log truncated, earliest lines dropped] ...";

static BUFFERS: Lazy<DashMap<String, Mutex<VecDeque<String>>>> = Lazy::new(DashMap::new);

pub fn start_capture(run_id: &str) {
	BUFFERS.insert(run_id.to_string(), Mutex::new(VecDeque::with_capacity(MAX_LINES)));
}

pub fn capture_line(run_id: &str, line: String) {
	if let Some(buffer) = BUFFERS.get(run_id) {
		let mut buf = buffer.lock();
		if buf.len() >= MAX_LINES {
			if buf.front().map(String::as_str) != Some(TRUNCATION_SENTINEL) {
				buf.pop_front();
				buf.push_front(TRUNCATION_SENTINEL.to_string());
			} else {
				buf.remove(1);
			}
		}
		buf.push_back(line);
	}
}

pub fn finish_capture(run_id: &str) -> String {
	match BUFFERS.remove(run_id) {
		Some((_, buffer)) => buffer.into_inner().into_iter().collect::<Vec<_>>().join("\n"),
		None => String::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn captures_and_flushes_lines_in_order() {
		let run_id = "test-run-capture";
		start_capture(run_id);
		capture_line(run_id, "line one".to_string());
		capture_line(run_id, "line two".to_string());
		let output = finish_capture(run_id);
		assert_eq!(output, "line one\nline two");
	}

	#[test]
	fn finish_without_start_yields_empty_string() {
		assert_eq!(finish_capture("never-started"), "");
	}

	#[test]
	fn bounds_buffer_at_max_lines_with_truncation_sentinel() {
		let run_id = "test-run-bounded";
		start_capture(run_id);
		for i in 0..(MAX_LINES + 10) {
			capture_line(run_id, format!("line {}", i));
		}
		let output = finish_capture(run_id);
		assert!(output.contains(TRUNCATION_SENTINEL));
		assert!(output.lines().count() <= MAX_LINES);
	}
}
