//! Batched multi-row upsert query building.
//!
//! Grounded on substrate-archive's `database/batch.rs` dynamic
//! multi-row-insert builder (there: a hand-rolled `Chunk`/`Batch` pair
//! wrapping `PgArguments` because sqlx 0.4 has no query builder). This is
//! a much smaller version of the same idea, sized for evidence rows and
//! node/edge batches instead of storage-trie changesets.

use sqlx::postgres::PgArguments;
use sqlx::Arguments;

/// Caps how many rows one `INSERT ... VALUES (...), (...), ...`
/// statement binds before being split into another statement. Chosen
/// conservatively; unlike substrate-archive's storage-trie batches this
/// crate's batches (evidence rows, node upserts) are modest in size.
pub const CHUNK_MAX: usize = 1_000;

pub struct Batch {
	statements: Vec<(String, PgArguments)>,
	current_sql: String,
	current_args: PgArguments,
	current_rows: usize,
	prefix: String,
	suffix: String,
}

impl Batch {
	pub fn new(prefix: &str, suffix: &str) -> Self {
		Batch {
			statements: Vec::new(),
			current_sql: prefix.to_string(),
			current_args: PgArguments::default(),
			current_rows: 0,
			prefix: prefix.to_string(),
			suffix: suffix.to_string(),
		}
	}

	/// Append one row's worth of bound placeholders (the caller builds
	/// the `($1, $2, ...)` fragment since binding order is positional).
	pub fn push_row(&mut self, row_sql: &str, bind: impl FnOnce(&mut PgArguments)) {
		if self.current_rows > 0 {
			self.current_sql.push(',');
		}
		self.current_sql.push_str(row_sql);
		bind(&mut self.current_args);
		self.current_rows += 1;

		if self.current_rows >= CHUNK_MAX {
			self.flush();
		}
	}

	fn flush(&mut self) {
		if self.current_rows == 0 {
			return;
		}
		self.current_sql.push_str(&self.suffix);
		let sql = std::mem::replace(&mut self.current_sql, self.prefix.clone());
		let args = std::mem::take(&mut self.current_args);
		self.statements.push((sql, args));
		self.current_rows = 0;
	}

	/// Finalize and return the full set of statements to execute.
	pub fn finish(mut self) -> Vec<(String, PgArguments)> {
		self.flush();
		self.statements
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_batch_yields_no_statements() {
		let batch = Batch::new("INSERT INTO t (a) VALUES ", " ON CONFLICT DO NOTHING");
		assert!(batch.finish().is_empty());
	}

	#[test]
	fn single_row_yields_one_statement() {
		let mut batch = Batch::new("INSERT INTO t (a) VALUES ", " ON CONFLICT DO NOTHING");
		batch.push_row("($1)", |args| args.add("x"));
		let statements = batch.finish();
		assert_eq!(statements.len(), 1);
		assert!(statements[0].0.contains("VALUES ($1)"));
	}
}
