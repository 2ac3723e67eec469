//! String formatting utilities for log output.

/// Truncates an identifier for display purposes.
///
/// Shows only the first 12 characters followed by ".." for longer ids, which
/// keeps trade numbers and order ids readable in log lines.
pub fn truncate_id(id: &str) -> String {
	if id.chars().count() <= 12 {
		id.to_string()
	} else {
		let head: String = id.chars().take(12).collect();
		format!("{}..", head)
	}
}
