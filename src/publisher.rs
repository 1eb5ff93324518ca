//! The outward-facing contract: what the wallet/RPC layer must provide.
//!
//! The core needs exactly two operations from the outside world —
//! publishing a message and registering a key — and it needs their
//! failures to stay in their lane: everything a publisher returns is a
//! `Publisher` error, never a crypto error, and the core never touches
//! transport concerns (retries, gas, receipts beyond an identifier).
//!
//! `MemoryPublisher` is the in-process implementation used by tests and
//! the demo binary; it doubles as the coordinator's view of the message
//! board.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::message::EncryptedMessage;
use crate::F;

/// Minimal acknowledgement of an accepted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transport-level transaction identifier.
    pub tx_hash: String,
}

/// The two operations the core requires from the outside.
pub trait Publisher: Send + Sync {
    /// Publish one encrypted message to a poll. Idempotency and retry
    /// policy are the caller's business; the core treats any `Err` as
    /// "nothing happened" and leaves the ballot untouched.
    fn publish_message(&self, poll_address: &str, message: &EncryptedMessage)
        -> Result<TxReceipt>;

    /// Register a public key; returns the state index assigned by the
    /// registration event.
    fn sign_up(&self, public_key: (F, F), gate_data: &[u8], credit_data: &[u8]) -> Result<u64>;
}

/// In-memory publisher: records everything, assigns state indexes from
/// 1 upward (index 0 is the reserved blank leaf), and can be armed to
/// fail the next publish to exercise error paths.
pub struct MemoryPublisher {
    published: Mutex<Vec<(String, EncryptedMessage)>>,
    registered: Mutex<Vec<(F, F)>>,
    next_state_index: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            next_state_index: AtomicU64::new(1),
            fail_next: Mutex::new(None),
        }
    }

    /// Arm the next `publish_message` call to fail with `reason`.
    pub fn fail_next_publish(&self, reason: impl Into<String>) {
        *self.fail_next.lock().expect("publisher poisoned") = Some(reason.into());
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<(String, EncryptedMessage)> {
        self.published.lock().expect("publisher poisoned").clone()
    }

    /// Every key registered so far, in order.
    pub fn registered(&self) -> Vec<(F, F)> {
        self.registered.lock().expect("publisher poisoned").clone()
    }
}

impl Publisher for MemoryPublisher {
    fn publish_message(
        &self,
        poll_address: &str,
        message: &EncryptedMessage,
    ) -> Result<TxReceipt> {
        if let Some(reason) = self.fail_next.lock().expect("publisher poisoned").take() {
            return Err(Error::Publisher(reason));
        }
        let mut published = self.published.lock().expect("publisher poisoned");
        published.push((poll_address.to_string(), message.clone()));
        Ok(TxReceipt {
            tx_hash: format!("0xlocal{:04x}", published.len()),
        })
    }

    fn sign_up(&self, public_key: (F, F), _gate_data: &[u8], _credit_data: &[u8]) -> Result<u64> {
        self.registered
            .lock()
            .expect("publisher poisoned")
            .push(public_key);
        Ok(self.next_state_index.fetch_add(1, Ordering::SeqCst))
    }
}
