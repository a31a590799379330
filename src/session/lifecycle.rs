//! App lifecycle subscription used to force freshness checks on foreground.

// self
use crate::{_prelude::*, session::SessionCoordinator};

/// Handler invoked when the app becomes active.
pub type BecameActiveHandler = Arc<dyn Fn() + Send + Sync>;

/// Source of platform lifecycle signals.
pub trait LifecycleEvents
where
	Self: Send + Sync,
{
	/// Registers `handler` to run every time the app becomes active.
	fn on_became_active(&self, handler: BecameActiveHandler);
}

/// In-process lifecycle signal the platform layer drives.
#[derive(Default)]
pub struct LifecycleSignal {
	handlers: RwLock<Vec<BecameActiveHandler>>,
}
impl LifecycleSignal {
	/// Notifies every subscriber that the app became active.
	pub fn emit_became_active(&self) {
		let handlers = self.handlers.read().clone();

		for handler in handlers {
			handler();
		}
	}

	/// Number of registered handlers.
	pub fn subscriber_count(&self) -> usize {
		self.handlers.read().len()
	}
}
impl LifecycleEvents for LifecycleSignal {
	fn on_became_active(&self, handler: BecameActiveHandler) {
		self.handlers.write().push(handler);
	}
}
impl Debug for LifecycleSignal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LifecycleSignal").field("subscribers", &self.subscriber_count()).finish()
	}
}

impl SessionCoordinator {
	/// Subscribes the coordinator to `events`; call once per coordinator.
	///
	/// The subscription holds a weak reference and becomes a no-op after the coordinator is
	/// dropped.
	pub fn attach_lifecycle(self: &Arc<Self>, events: &dyn LifecycleEvents) {
		let weak = Arc::downgrade(self);

		events.on_became_active(Arc::new(move || {
			if let Some(coordinator) = weak.upgrade() {
				coordinator.on_app_became_active();
			}
		}));
	}
}
