//! Periodic background tasks owned by gateway components.

// crates.io
use tokio::{
	task::JoinHandle,
	time::{self, Instant, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	obs::{self, OperationKind},
	session::SessionCoordinator,
};

/// Handle to a spawned periodic task; dropping it aborts the task.
#[derive(Debug)]
pub struct BackgroundTask(JoinHandle<()>);
impl BackgroundTask {
	/// Aborts the task immediately.
	pub fn abort(&self) {
		self.0.abort();
	}

	/// Returns `true` once the task has stopped.
	pub fn is_finished(&self) -> bool {
		self.0.is_finished()
	}
}
impl Drop for BackgroundTask {
	fn drop(&mut self) {
		self.0.abort();
	}
}

/// Spawns a task that runs `tick` every `period`, starting one period from now.
///
/// The task stops when `tick` returns `None`, which owners use once their component is gone.
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_periodic<F, Fut>(period: StdDuration, mut tick: F) -> BackgroundTask
where
	F: 'static + FnMut() -> Option<Fut> + Send,
	Fut: Future<Output = ()> + Send,
{
	// `interval_at` panics on a zero period.
	let period = period.max(StdDuration::from_millis(1));
	let handle = tokio::spawn(async move {
		let mut interval = time::interval_at(Instant::now() + period, period);

		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			interval.tick().await;

			match tick() {
				Some(work) => work.await,
				None => break,
			}
		}
	});

	BackgroundTask(handle)
}

impl SessionCoordinator {
	/// Starts the proactive freshness check on the configured refresh interval.
	///
	/// The task holds only a weak reference, so it ends once the coordinator is dropped.
	/// Must be called from within a Tokio runtime.
	pub fn spawn_proactive_refresh(self: &Arc<Self>) -> BackgroundTask {
		let weak = Arc::downgrade(self);

		spawn_periodic(self.config.refresh_interval, move || {
			let coordinator = weak.upgrade()?;

			Some(async move {
				if !coordinator.ensure_fresh().await {
					obs::debug_event(OperationKind::Refresh, &"proactive refresh did not complete");
				}
			})
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn periodic_task_runs_until_tick_declines() {
		let ticks = Arc::new(AtomicUsize::new(0));
		let counter = ticks.clone();
		let task = spawn_periodic(StdDuration::from_millis(5), move || {
			let seen = counter.fetch_add(1, Ordering::SeqCst);

			(seen < 2).then_some(async {})
		});

		for _ in 0..200 {
			if task.is_finished() {
				break;
			}

			time::sleep(StdDuration::from_millis(5)).await;
		}

		assert!(task.is_finished());
		assert_eq!(ticks.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn dropping_the_handle_aborts_the_task() {
		let ticks = Arc::new(AtomicUsize::new(0));
		let counter = ticks.clone();
		let task = spawn_periodic(StdDuration::from_secs(3600), move || {
			counter.fetch_add(1, Ordering::SeqCst);

			Some(async {})
		});

		drop(task);
		time::sleep(StdDuration::from_millis(10)).await;

		assert_eq!(ticks.load(Ordering::SeqCst), 0);
	}
}
