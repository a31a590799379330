//! Buffered, sequenced location telemetry with at-least-once batch delivery.
//!
//! Every fix receives the next per-device sequence number and waits in an ordered buffer.
//! A flush sends the whole buffer as one idempotent batch and trims only what the server
//! acknowledges through `applied_up_to_seq`; anything else is resent by a later flush. The
//! server deduplicates on `(device_id, seq)`, so resending acknowledged-but-untrimmed samples
//! is harmless.

mod ack;
mod sample;

pub use ack::*;
pub use sample::*;

// self
use crate::{
	_prelude::*,
	auth::DeviceId,
	config::FlushPolicy,
	idempotency,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	pipeline::{RequestOptions, RequestPipeline},
	session::{BackgroundTask, timer},
};

const BATCH_OPERATION: &str = "location-batch";

/// Result of buffering one fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleReceipt {
	/// Sequence number assigned to the sample.
	pub seq: u64,
	/// Whether the buffer reached the flush threshold.
	pub flush_due: bool,
}

#[derive(Debug)]
struct SampleBuffer {
	samples: VecDeque<LocationSample>,
	next_seq: u64,
}
impl SampleBuffer {
	fn new(next_seq: u64) -> Self {
		Self { samples: VecDeque::new(), next_seq: next_seq.max(1) }
	}

	fn push(&mut self, fix: LocationFix) -> u64 {
		let seq = self.next_seq;

		self.next_seq += 1;
		self.samples.push_back(LocationSample::from_fix(seq, fix));

		seq
	}

	// Samples are pushed in sequence order, so acknowledged ones form a prefix.
	fn trim_acknowledged(&mut self, applied_up_to_seq: u64) -> usize {
		let before = self.samples.len();

		while self.samples.front().is_some_and(|sample| sample.seq <= applied_up_to_seq) {
			self.samples.pop_front();
		}

		before - self.samples.len()
	}
}

/// Sequences location fixes and uploads them in acknowledged batches.
pub struct TelemetryBatchUploader {
	pipeline: Arc<RequestPipeline>,
	device_id: DeviceId,
	policy: FlushPolicy,
	buffer: Mutex<SampleBuffer>,
	flush_guard: AsyncMutex<()>,
}
impl TelemetryBatchUploader {
	/// Creates an uploader for `device_id` whose first sample gets `seq = 1`.
	pub fn new(pipeline: Arc<RequestPipeline>, device_id: DeviceId) -> Self {
		Self::resume(pipeline, device_id, 1)
	}

	/// Creates an uploader that continues a persisted counter at `next_seq`.
	///
	/// A counter that cannot be restored must not restart at 1 under the same identity; use
	/// [`TelemetryBatchUploader::with_fresh_device`] instead.
	pub fn resume(pipeline: Arc<RequestPipeline>, device_id: DeviceId, next_seq: u64) -> Self {
		Self {
			pipeline,
			device_id,
			policy: FlushPolicy::default(),
			buffer: Mutex::new(SampleBuffer::new(next_seq)),
			flush_guard: AsyncMutex::new(()),
		}
	}

	/// Creates an uploader under a newly generated device identity.
	pub fn with_fresh_device(pipeline: Arc<RequestPipeline>) -> Self {
		Self::new(pipeline, DeviceId::generate())
	}

	/// Replaces the flush policy.
	pub fn with_policy(mut self, policy: FlushPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Device identity the samples are sent under.
	pub fn device_id(&self) -> &DeviceId {
		&self.device_id
	}

	/// Active flush policy.
	pub fn policy(&self) -> &FlushPolicy {
		&self.policy
	}

	/// Sequence number the next sample will receive; persist it to resume later.
	pub fn next_seq(&self) -> u64 {
		self.buffer.lock().next_seq
	}

	/// Number of buffered samples.
	pub fn len(&self) -> usize {
		self.buffer.lock().samples.len()
	}

	/// Returns `true` when nothing is buffered.
	pub fn is_empty(&self) -> bool {
		self.buffer.lock().samples.is_empty()
	}

	/// Sequence numbers currently buffered, in order.
	pub fn buffered_seqs(&self) -> Vec<u64> {
		self.buffer.lock().samples.iter().map(|sample| sample.seq).collect()
	}

	/// Buffers `fix` under the next sequence number.
	pub fn add_sample(&self, fix: LocationFix) -> SampleReceipt {
		let mut buffer = self.buffer.lock();
		let seq = buffer.push(fix);

		SampleReceipt { seq, flush_due: buffer.samples.len() >= self.policy.threshold }
	}

	/// Buffers `fix` and flushes when the size threshold is reached.
	///
	/// The sample stays buffered when the flush fails; the error is returned so callers can
	/// surface it, and the next flush retries.
	pub async fn record(&self, fix: LocationFix) -> Result<Option<FlushReport>> {
		if self.add_sample(fix).flush_due { self.flush().await } else { Ok(None) }
	}

	/// Sends every buffered sample as one batch.
	///
	/// Returns `Ok(None)` when the buffer is empty. On any failure the buffer is left intact.
	/// Flushes are serialized; a flush waiting on another one sends whatever remains after it.
	pub async fn flush(&self) -> Result<Option<FlushReport>> {
		const KIND: OperationKind = OperationKind::TelemetryFlush;

		let _serialized = self.flush_guard.lock().await;
		let batch: Vec<_> = self.buffer.lock().samples.iter().cloned().collect();

		if batch.is_empty() {
			return Ok(None);
		}

		let span = OperationSpan::new(KIND, "flush");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		match span.instrument(self.send_batch(&batch)).await {
			Ok(report) => {
				obs::record_outcome(KIND, OperationOutcome::Success);

				Ok(Some(report))
			},
			Err(e) => {
				obs::record_outcome(KIND, OperationOutcome::Failure);
				obs::warn_event(
					KIND,
					&format_args!("batch of {} samples not acknowledged: {e}", batch.len()),
				);

				Err(e)
			},
		}
	}

	/// Starts the timed flush on the policy interval.
	///
	/// The task holds only a weak reference, so it ends once the uploader is dropped.
	/// Must be called from within a Tokio runtime.
	pub fn spawn_flush_timer(self: &Arc<Self>) -> BackgroundTask {
		let weak = Arc::downgrade(self);

		timer::spawn_periodic(self.policy.interval, move || {
			let uploader = weak.upgrade()?;

			// Failures are already logged by `flush`; the samples wait for the next tick.
			Some(async move {
				let _ = uploader.flush().await;
			})
		})
	}

	async fn send_batch(&self, batch: &[LocationSample]) -> Result<FlushReport> {
		let key = idempotency::generate(BATCH_OPERATION, &self.device_id);
		let payload = BatchPayload { device_id: &self.device_id, locations: batch };
		let options =
			RequestOptions::idempotent(key.clone()).with_device_id(self.device_id.clone());
		let response = self
			.pipeline
			.post::<_, BatchAckBody>(&self.policy.batch_path, &payload, options)
			.await?;
		let body = response.data;

		if !body.success {
			return Err(Error::Unknown {
				status: Some(response.status),
				message: body.message.unwrap_or_else(|| "Batch was not accepted".into()),
			});
		}

		let (trimmed, remaining) = {
			let mut buffer = self.buffer.lock();
			let trimmed = buffer.trim_acknowledged(body.result.applied_up_to_seq);

			(trimmed, buffer.samples.len())
		};

		Ok(FlushReport {
			ack: body.result,
			auto_duty_changes: body.auto_duty_changes,
			idempotency_key: key,
			sent: batch.len(),
			trimmed,
			remaining,
		})
	}
}
impl Debug for TelemetryBatchUploader {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let buffer = self.buffer.lock();

		f.debug_struct("TelemetryBatchUploader")
			.field("device_id", &self.device_id)
			.field("policy", &self.policy)
			.field("buffered", &buffer.samples.len())
			.field("next_seq", &buffer.next_seq)
			.finish()
	}
}
