//! Batch acknowledgement returned by the location endpoint.

// crates.io
use serde::Deserializer;
// self
use crate::{_prelude::*, idempotency::IdempotencyKey};

/// Server-side duty status transition triggered by a sample.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDutyChange {
	/// Sample that triggered the change.
	pub seq: u64,
	/// Whether the server actually switched the status.
	#[serde(default, deserialize_with = "null_as_default")]
	pub auto_changed: bool,
	/// Status before the change.
	#[serde(default)]
	pub old_status: Option<String>,
	/// Status after the change.
	#[serde(default)]
	pub new_status: Option<String>,
	/// Server-provided explanation.
	#[serde(default)]
	pub reason: Option<String>,
}

/// Per-batch counters reported by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAckResult {
	/// Highest sequence number the server has durably applied.
	#[serde(default, deserialize_with = "null_as_default")]
	pub applied_up_to_seq: u64,
	/// Samples processed in this batch.
	#[serde(default, deserialize_with = "null_as_default")]
	pub processed_count: u64,
	/// Samples skipped because `(device_id, seq)` was already stored.
	#[serde(default, deserialize_with = "null_as_default")]
	pub skipped_duplicate_count: u64,
	/// Samples skipped because they were older than the applied watermark.
	#[serde(default, deserialize_with = "null_as_default")]
	pub skipped_old_seq_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchAckBody {
	#[serde(default = "default_success")]
	pub(crate) success: bool,
	#[serde(default)]
	pub(crate) message: Option<String>,
	#[serde(flatten)]
	pub(crate) result: BatchAckResult,
	#[serde(default, deserialize_with = "null_as_default")]
	pub(crate) auto_duty_changes: Vec<AutoDutyChange>,
}

/// Outcome of one acknowledged flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushReport {
	/// Server counters for the batch.
	pub ack: BatchAckResult,
	/// Duty status changes the server derived from the batch.
	pub auto_duty_changes: Vec<AutoDutyChange>,
	/// Key the batch was sent under.
	pub idempotency_key: IdempotencyKey,
	/// Samples included in the request.
	pub sent: usize,
	/// Samples dropped from the buffer after the acknowledgement.
	pub trimmed: usize,
	/// Samples still buffered afterwards.
	pub remaining: usize,
}

fn default_success() -> bool {
	true
}

// Optional ack fields may arrive as explicit `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn ack_body_tolerates_missing_counters() {
		let body: BatchAckBody = serde_json::from_str(
			r#"{"applied_up_to_seq":10,"processed_count":10,
			"auto_duty_changes":[{"seq":4,"auto_changed":true,"old_status":"on_duty","new_status":"driving"}]}"#,
		)
		.expect("Ack fixture should decode.");

		assert!(body.success);
		assert_eq!(body.result.applied_up_to_seq, 10);
		assert_eq!(body.result.skipped_duplicate_count, 0);
		assert_eq!(body.auto_duty_changes.len(), 1);
		assert_eq!(body.auto_duty_changes[0].new_status.as_deref(), Some("driving"));
	}

	#[test]
	fn explicit_nulls_decode_as_defaults() {
		let body: BatchAckBody = serde_json::from_str(
			r#"{"success":true,"applied_up_to_seq":2,"processed_count":null,
			"skipped_duplicate_count":null,"auto_duty_changes":null}"#,
		)
		.expect("Null optional fields should decode.");

		assert_eq!(body.result.applied_up_to_seq, 2);
		assert_eq!(body.result.processed_count, 0);
		assert_eq!(body.result.skipped_duplicate_count, 0);
		assert!(body.auto_duty_changes.is_empty());

		let change: AutoDutyChange = serde_json::from_str(r#"{"seq":3,"auto_changed":null}"#)
			.expect("A null flag should decode.");

		assert!(!change.auto_changed);
	}
}
