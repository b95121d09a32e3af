//! The cooperative, cross-thread cancellation primitive.
//!
//! Cancellation is level-triggered and sticky: once a token's shared signal
//! is set it stays set for the signal's lifetime, and cancelling again is a
//! no-op. Clones share the signal, so a token handed to a worker observes a
//! cancel issued from the dispatching thread.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use parking_lot::{Condvar, Mutex};

use crate::error::Error;

#[derive(Debug, Default)]
struct Signal {
	cancelled: AtomicBool,
	mutex: Mutex<()>,
	cond: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
	signal: Arc<Signal>,
}

impl CancellationToken {
	/// A fresh token in the not-cancelled state, backed by its own signal.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the shared flag and wakes every blocked waiter. Idempotent.
	pub fn cancel(&self) {
		if self.signal.cancelled.swap(true, Ordering::SeqCst) {
			return;
		}

		let _guard = self.signal.mutex.lock();
		self.signal.cond.notify_all();
	}

	/// Non-blocking check of the shared flag.
	#[must_use]
	pub fn cancel_requested(&self) -> bool {
		self.signal.cancelled.load(Ordering::SeqCst)
	}

	/// Wakes blocked waiters without cancelling, so they can re-inspect
	/// whatever state they were parked on.
	pub fn wake_all(&self) {
		let _guard = self.signal.mutex.lock();
		self.signal.cond.notify_all();
	}

	/// Blocks the calling thread until the signal is cancelled or another
	/// thread wakes it, then reports cancellation if the flag is set.
	pub fn listen_for_cancel(&self) -> Result<(), Error> {
		{
			let mut guard = self.signal.mutex.lock();

			if !self.signal.cancelled.load(Ordering::SeqCst) {
				self.signal.cond.wait(&mut guard);
			}
		}

		self.throw_if_cancelled()
	}

	/// The cooperative checkpoint used between (and inside) pipeline stages.
	pub fn throw_if_cancelled(&self) -> Result<(), Error> {
		if self.cancel_requested() {
			Err(Error::Canceled)
		} else {
			Ok(())
		}
	}
}
