//! Caller-driven cancellation of a handoff wait.

use std::sync::Arc;

use tokio::sync::watch;

/// Creates a linked cancel handle and signal.
///
/// Calling [`CancelHandle::cancel`] wakes every clone of the signal. Dropping
/// the handle without cancelling leaves the signal pending forever.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// Requests that an in-flight handoff wait give up.
#[derive(Debug, Clone)]
pub struct CancelHandle {
	tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
	pub fn cancel(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_cancelled(&self) -> bool {
		*self.tx.borrow()
	}
}

/// Observed by a handoff wait; resolves once cancellation is requested.
#[derive(Debug, Clone)]
pub struct CancelSignal {
	rx: watch::Receiver<bool>,
}

impl CancelSignal {
	/// A signal that never fires.
	pub fn never() -> Self {
		cancellation().1
	}

	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}

	/// Completes when cancellation has been requested.
	pub async fn cancelled(&mut self) {
		loop {
			if *self.rx.borrow_and_update() {
				return;
			}
			if self.rx.changed().await.is_err() {
				std::future::pending::<()>().await;
			}
		}
	}
}

impl Default for CancelSignal {
	fn default() -> Self {
		Self::never()
	}
}
