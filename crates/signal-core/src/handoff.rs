//! Single-slot rendezvous between the delivery loop and the relay loop
//!
//! `send` waits for the slot to be empty, fills it, and then waits until the
//! receiver has taken the value. The producer can therefore never be more
//! than one value ahead of the consumer, and a value is never overwritten.

use signal_types::{Error, Result};
use tokio::sync::{mpsc, oneshot};

/// A value in the slot, with the signal that it was taken
struct Parcel<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Producer half. Not `Clone`: there is exactly one producer.
pub struct HandoffSender<T> {
    slot: mpsc::Sender<Parcel<T>>,
}

/// Consumer half
pub struct HandoffReceiver<T> {
    slot: mpsc::Receiver<Parcel<T>>,
}

/// Create a connected sender/receiver pair sharing one empty slot
pub fn handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { slot: tx }, HandoffReceiver { slot: rx })
}

impl<T> HandoffSender<T> {
    /// Put `value` in the slot and wait until the receiver takes it.
    ///
    /// Fails with `HandoffClosed` if the receiver is dropped first; the
    /// value is lost in that case.
    pub async fn send(&self, value: T) -> Result<()> {
        let (taken, was_taken) = oneshot::channel();
        self.slot
            .send(Parcel { value, taken })
            .await
            .map_err(|_| Error::HandoffClosed)?;
        was_taken.await.map_err(|_| Error::HandoffClosed)
    }

    /// Whether the receiver has gone away
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

impl<T> HandoffReceiver<T> {
    /// Wait for the slot to fill, then empty it.
    ///
    /// Returns `None` once the sender is dropped and the slot is empty.
    pub async fn receive(&mut self) -> Option<T> {
        let parcel = self.slot.recv().await?;
        // The sender may have stopped waiting; the value is ours either way.
        let _ = parcel.taken.send(());
        Some(parcel.value)
    }
}
