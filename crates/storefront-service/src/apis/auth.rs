//! Caller identity as forwarded by the authenticating proxy.
//!
//! The proxy in front of the service signs users in and forwards the user id
//! in `x-user-id` and the account role in `x-user-role` (`ADMIN` or `USER`).

use axum::http::HeaderMap;
use storefront_types::APIError;

/// Header carrying the authenticated user.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "ADMIN";

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
	pub user_id: String,
	pub is_admin: bool,
}

impl Caller {
	/// Whether the caller may act on a resource owned by `owner_id`.
	pub fn can_access(&self, owner_id: &str) -> bool {
		self.is_admin || self.user_id == owner_id
	}
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
}

/// Reads the caller, failing with 401 when no user is forwarded.
pub fn caller(headers: &HeaderMap) -> Result<Caller, APIError> {
	let user_id = header_value(headers, USER_ID_HEADER).ok_or_else(|| APIError::Unauthorized {
		message: "Missing authenticated user".into(),
	})?;
	let is_admin = header_value(headers, USER_ROLE_HEADER)
		.is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE));

	Ok(Caller {
		user_id: user_id.to_string(),
		is_admin,
	})
}

/// Reads the caller and requires the admin role (403 otherwise).
pub fn admin(headers: &HeaderMap) -> Result<Caller, APIError> {
	let caller = caller(headers)?;
	if !caller.is_admin {
		tracing::warn!(user_id = %caller.user_id, "Admin endpoint called without admin role");
		return Err(forbidden("Administrator role required"));
	}
	Ok(caller)
}

pub fn forbidden(message: &str) -> APIError {
	APIError::Forbidden {
		error_type: "PERMISSION_DENIED".into(),
		message: message.into(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	#[test]
	fn test_caller_requires_user_id() {
		let mut headers = HeaderMap::new();
		assert!(matches!(caller(&headers), Err(APIError::Unauthorized { .. })));

		headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
		assert!(caller(&headers).is_err());

		headers.insert(USER_ID_HEADER, HeaderValue::from_static("user-1"));
		let c = caller(&headers).unwrap();
		assert_eq!(c.user_id, "user-1");
		assert!(!c.is_admin);
	}

	#[test]
	fn test_admin_role() {
		let mut headers = HeaderMap::new();
		headers.insert(USER_ID_HEADER, HeaderValue::from_static("staff-1"));
		headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("USER"));
		assert_eq!(admin(&headers).unwrap_err().status_code(), 403);

		headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("admin"));
		let c = admin(&headers).unwrap();
		assert!(c.is_admin);
		assert!(c.can_access("someone-else"));
	}

	#[test]
	fn test_owner_access() {
		let c = Caller {
			user_id: "user-1".into(),
			is_admin: false,
		};
		assert!(c.can_access("user-1"));
		assert!(!c.can_access("user-2"));
	}
}
