//! Response classification: decoding success bodies and mapping failures onto error kinds.

// crates.io
use ::http::StatusCode;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::FieldErrors,
	http::HttpResponse,
	pipeline::ApiResponse,
};

const MESSAGE_KEYS: [&str; 3] = ["message", "detail", "error"];
const RESERVED_KEYS: [&str; 6] = ["message", "detail", "error", "success", "code", "errors"];
const MAX_TEXT_MESSAGE: usize = 200;

/// Decodes a 2xx body into `T`; empty bodies decode as JSON `null`.
pub(crate) fn decode<T>(status: StatusCode, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(json_or_null(body));

	serde_path_to_error::deserialize(&mut de)
		.map_err(|source| Error::Decode { source, status: status.as_u16() })
}

/// Wraps a successful response into an [`ApiResponse`].
pub(crate) fn into_api_response<T>(response: HttpResponse) -> Result<ApiResponse<T>>
where
	T: DeserializeOwned,
{
	let status = response.status();
	let payload: Value = decode(status, response.body())?;
	let message = payload.get("message").and_then(Value::as_str).map(str::to_owned);
	let data = serde_path_to_error::deserialize(payload)
		.map_err(|source| Error::Decode { source, status: status.as_u16() })?;

	Ok(ApiResponse { success: true, status: status.as_u16(), data, message })
}

/// Maps a non-2xx response onto a typed error.
pub(crate) fn failure(status: StatusCode, body: &[u8]) -> Error {
	let payload = serde_json::from_slice::<Value>(body).ok();
	let message = message(status, body, payload.as_ref());
	let code = status.as_u16();

	if status == StatusCode::UNAUTHORIZED {
		return Error::Unauthorized { message };
	}
	if status.is_server_error() {
		return Error::Server { status: code, message };
	}
	if status.is_client_error() {
		let field_errors = payload.as_ref().map(field_errors).unwrap_or_default();

		if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY)
			|| !field_errors.is_empty()
		{
			return Error::Validation { status: code, message, field_errors };
		}
	}

	Error::Unknown { status: Some(code), message }
}

/// Best human-readable message for a failed response.
pub(crate) fn message(status: StatusCode, body: &[u8], payload: Option<&Value>) -> String {
	if let Some(found) = payload.and_then(payload_message) {
		return found;
	}

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	if !text.is_empty() && payload.is_none() && !text.starts_with('<') {
		return text.chars().take(MAX_TEXT_MESSAGE).collect();
	}

	status.canonical_reason().unwrap_or("Unexpected response").to_owned()
}

fn payload_message(payload: &Value) -> Option<String> {
	MESSAGE_KEYS
		.iter()
		.find_map(|key| payload.get(key).and_then(Value::as_str))
		.or_else(|| payload.get("non_field_errors").and_then(first_string))
		.filter(|message| !message.trim().is_empty())
		.map(str::to_owned)
}

fn field_errors(payload: &Value) -> FieldErrors {
	let mut fields = FieldErrors::new();

	match payload.get("errors") {
		Some(Value::Object(errors)) =>
			for (field, value) in errors {
				if let Some(messages) = messages(value, true) {
					fields.insert(field.clone(), messages);
				}
			},
		_ =>
			if let Value::Object(map) = payload {
				for (field, value) in map {
					if RESERVED_KEYS.contains(&field.as_str()) {
						continue;
					}
					if let Some(messages) = messages(value, false) {
						fields.insert(field.clone(), messages);
					}
				}
			},
	}

	fields
}

// Top-level keys only count as fields when shaped like field errors (arrays of strings).
fn messages(value: &Value, allow_plain_string: bool) -> Option<Vec<String>> {
	match value {
		Value::String(message) if allow_plain_string => Some(vec![message.clone()]),
		Value::Array(items) => {
			let messages: Vec<_> =
				items.iter().filter_map(Value::as_str).map(str::to_owned).collect();

			(!messages.is_empty() && messages.len() == items.len()).then_some(messages)
		},
		_ => None,
	}
}

fn first_string(value: &Value) -> Option<&str> {
	value.as_array()?.iter().find_map(Value::as_str)
}

fn json_or_null(body: &[u8]) -> &[u8] {
	if body.iter().all(u8::is_ascii_whitespace) { b"null".as_slice() } else { body }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn validation_errors_carry_field_maps() {
		let body = br#"{"odometer":["Ensure this value is greater than 0."],"detail":"Invalid fuel entry"}"#;
		let error = failure(StatusCode::BAD_REQUEST, body);

		assert_eq!(error.kind(), ErrorKind::Validation);
		assert_eq!(error.code(), 400);
		assert_eq!(error.to_string(), "Validation failed (400): Invalid fuel entry.");
		assert_eq!(
			error.field_errors().and_then(|fields| fields.get("odometer")).map(Vec::len),
			Some(1)
		);
	}

	#[test]
	fn nested_errors_object_is_preferred() {
		let body = br#"{"message":"Bad payload","errors":{"latitude":"out of range","heading":["required"]}}"#;
		let error = failure(StatusCode::CONFLICT, body);

		assert_eq!(error.kind(), ErrorKind::Validation);

		let fields = error.field_errors().expect("Field errors should be attached.");

		assert_eq!(fields.get("latitude"), Some(&vec!["out of range".to_string()]));
		assert_eq!(fields.get("heading"), Some(&vec!["required".to_string()]));
	}

	#[test]
	fn other_statuses_classify_by_range() {
		assert_eq!(failure(StatusCode::BAD_GATEWAY, b"<html>").kind(), ErrorKind::Server);
		assert_eq!(failure(StatusCode::NOT_FOUND, br#"{"detail":"Not found."}"#).kind(), ErrorKind::Unknown);
		assert_eq!(failure(StatusCode::UNAUTHORIZED, b"").kind(), ErrorKind::Unauthorized);
		assert_eq!(
			failure(StatusCode::SERVICE_UNAVAILABLE, b"").to_string(),
			"Server error (503): Service Unavailable."
		);
		assert_eq!(
			failure(StatusCode::TOO_MANY_REQUESTS, b"slow down").to_string(),
			"Unexpected response: slow down."
		);
	}

	#[test]
	fn non_field_errors_supply_the_message() {
		let body = br#"{"non_field_errors":["Log already certified."]}"#;
		let error = failure(StatusCode::BAD_REQUEST, body);

		assert_eq!(error.to_string(), "Validation failed (400): Log already certified.");
		assert!(error.field_errors().is_some_and(|fields| fields.contains_key("non_field_errors")));
	}

	#[test]
	fn empty_success_bodies_decode_as_null() {
		let value: Option<Value> =
			decode(StatusCode::NO_CONTENT, b"").expect("Empty bodies should decode as null.");

		assert!(value.is_none());

		let error = decode::<u32>(StatusCode::OK, br#""seven""#)
			.expect_err("Mismatched bodies should surface a decode error.");

		assert_eq!(error.kind(), ErrorKind::Unknown);
		assert_eq!(error.code(), 200);
	}
}
