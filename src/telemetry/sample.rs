//! Location samples and the batch wire payload.

// self
use crate::{_prelude::*, auth::DeviceId};

/// Position fix captured by the device, before a sequence number is assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationFix {
	/// Device clock at capture time.
	pub device_time: OffsetDateTime,
	/// Latitude in decimal degrees.
	pub latitude: f64,
	/// Longitude in decimal degrees.
	pub longitude: f64,
	/// Ground speed in miles per hour.
	pub speed_mph: Option<f64>,
	/// Heading in degrees.
	pub heading: Option<f64>,
	/// Vehicle odometer reading.
	pub odometer: Option<f64>,
	/// Horizontal accuracy in meters.
	pub accuracy_m: Option<f64>,
}
impl LocationFix {
	/// Creates a fix with only the mandatory fields.
	pub fn new(device_time: OffsetDateTime, latitude: f64, longitude: f64) -> Self {
		Self {
			device_time,
			latitude,
			longitude,
			speed_mph: None,
			heading: None,
			odometer: None,
			accuracy_m: None,
		}
	}

	/// Sets the ground speed.
	pub fn with_speed_mph(mut self, speed: f64) -> Self {
		self.speed_mph = Some(speed);

		self
	}

	/// Sets the heading.
	pub fn with_heading(mut self, heading: f64) -> Self {
		self.heading = Some(heading);

		self
	}

	/// Sets the odometer reading.
	pub fn with_odometer(mut self, odometer: f64) -> Self {
		self.odometer = Some(odometer);

		self
	}

	/// Sets the horizontal accuracy.
	pub fn with_accuracy_m(mut self, accuracy: f64) -> Self {
		self.accuracy_m = Some(accuracy);

		self
	}
}

/// Buffered fix with its per-device sequence number, serialized as one batch item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
	/// Per-device sequence number, starting at 1.
	pub seq: u64,
	/// Device clock at capture time (RFC 3339).
	#[serde(with = "time::serde::rfc3339")]
	pub device_time: OffsetDateTime,
	/// Latitude in decimal degrees.
	pub latitude: f64,
	/// Longitude in decimal degrees.
	pub longitude: f64,
	/// Ground speed in miles per hour.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub speed_mph: Option<f64>,
	/// Heading in degrees.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub heading: Option<f64>,
	/// Vehicle odometer reading.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub odometer: Option<f64>,
	/// Horizontal accuracy in meters.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accuracy_m: Option<f64>,
}
impl LocationSample {
	/// Attaches `seq` to `fix`.
	pub fn from_fix(seq: u64, fix: LocationFix) -> Self {
		Self {
			seq,
			device_time: fix.device_time,
			latitude: fix.latitude,
			longitude: fix.longitude,
			speed_mph: fix.speed_mph,
			heading: fix.heading,
			odometer: fix.odometer,
			accuracy_m: fix.accuracy_m,
		}
	}
}

/// Request body of the batch endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct BatchPayload<'a> {
	pub(crate) device_id: &'a DeviceId,
	pub(crate) locations: &'a [LocationSample],
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	use time::macros;
	// self
	use super::*;

	#[test]
	fn payload_matches_the_batch_wire_shape() {
		let device_id = DeviceId::new("tablet-7").expect("Device fixture should be valid.");
		let fix = LocationFix::new(macros::datetime!(2026-03-02 08:15:30 UTC), 41.88, -87.63)
			.with_speed_mph(55.5)
			.with_accuracy_m(4.0);
		let locations = [LocationSample::from_fix(3, fix)];
		let payload = serde_json::to_value(BatchPayload { device_id: &device_id, locations: &locations })
			.expect("Batch payload should serialize.");

		assert_eq!(
			payload,
			json!({
				"device_id": "tablet-7",
				"locations": [{
					"seq": 3,
					"device_time": "2026-03-02T08:15:30Z",
					"latitude": 41.88,
					"longitude": -87.63,
					"speed_mph": 55.5,
					"accuracy_m": 4.0
				}]
			})
		);
	}
}
