//! Legacy percent-encoding required by the gateway.
//!
//! The gateway computes `CheckMacValue` over a .NET `HttpUtility.UrlEncode`
//! rendering of the canonical string. That encoder leaves `-_.!*()`
//! untouched and turns spaces into `+`, which no RFC 3986 encoder does, so
//! the mapping is spelled out here byte for byte.

const UPPER_HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Returns true for characters emitted verbatim.
fn is_unreserved(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '!' | '*' | '(' | ')')
}

/// Percent-encodes `input` using the gateway's legacy rule set.
///
/// - `0-9`, `A-Z`, `a-z` and `-_.!*()` pass through unchanged;
/// - a space becomes `+`;
/// - every other character is written as its UTF-8 bytes, each as `%XX`
///   with uppercase hex digits.
///
/// Case is preserved; lowercasing is a separate signing step.
pub fn legacy_url_encode(input: &str) -> String {
	let mut out = String::with_capacity(input.len() * 3);
	let mut buf = [0u8; 4];

	for c in input.chars() {
		if is_unreserved(c) {
			out.push(c);
		} else if c == ' ' {
			out.push('+');
		} else {
			for byte in c.encode_utf8(&mut buf).as_bytes() {
				out.push('%');
				out.push(UPPER_HEX[(byte >> 4) as usize] as char);
				out.push(UPPER_HEX[(byte & 0x0f) as usize] as char);
			}
		}
	}

	out
}

/// Escapes a value for use inside a double-quoted HTML attribute.
pub fn escape_html_attribute(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for c in input.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			other => out.push(other),
		}
	}
	out
}
