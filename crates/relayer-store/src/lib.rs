//! In-memory pending-operation store.
//!
//! Correlates the two-phase prepare/submit flow: `prepare` creates an
//! entry keyed by an unguessable id, `submit` claims it exactly once.
//! The claim (`begin_submit`) is the at-most-once gate: two concurrent
//! submits for the same id race on a single status transition under one
//! lock, so at most one ever reaches the chain.
//!
//! The store owns no I/O. Time comes from an injected [`Clock`] so
//! expiry is testable with a fake clock, per the store's design.

use alloy::primitives::B256;
use relayer_types::SwapIntent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How long terminal entries stay queryable before the reaper drops them.
const TERMINAL_RETENTION_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Operation not found")]
	NotFound,
	#[error("Operation expired")]
	Expired,
	#[error("Operation already consumed")]
	Consumed,
}

/// Lifecycle of a pending operation.
///
/// `Submitting` is the transient claim state between a successful
/// `begin_submit` and the terminal transition; it is never observable as
/// a resting state by API clients under normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
	AwaitingSignature,
	Submitting,
	Submitted,
	Confirmed,
	Failed,
	Expired,
}

impl OperationStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OperationStatus::AwaitingSignature => "awaiting_signature",
			OperationStatus::Submitting => "submitting",
			OperationStatus::Submitted => "submitted",
			OperationStatus::Confirmed => "confirmed",
			OperationStatus::Failed => "failed",
			OperationStatus::Expired => "expired",
		}
	}

	fn is_terminal(&self) -> bool {
		matches!(
			self,
			OperationStatus::Submitted
				| OperationStatus::Confirmed
				| OperationStatus::Failed
				| OperationStatus::Expired
		)
	}
}

/// A prepared intent awaiting its signature, or the record of what
/// became of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
	pub op_id: String,
	pub intent: SwapIntent,
	pub typed_data: serde_json::Value,
	pub created_at: u64,
	pub status: OperationStatus,
	pub tx_hash: Option<B256>,
	pub failure_reason: Option<String>,
}

/// Injectable time source.
pub trait Clock: Send + Sync {
	/// Current unix timestamp in seconds.
	fn now(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> u64 {
		std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.expect("system time before unix epoch")
			.as_secs()
	}
}

/// The in-memory registry of pending operations.
pub struct OperationStore {
	ops: Mutex<HashMap<String, PendingOperation>>,
	clock: Arc<dyn Clock>,
	ttl: Duration,
}

impl OperationStore {
	pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
		Self {
			ops: Mutex::new(HashMap::new()),
			clock,
			ttl,
		}
	}

	/// Stores a freshly prepared intent and returns its opaque id.
	///
	/// Each call produces a distinct id, even for identical intents;
	/// entries share no state.
	pub fn create(&self, intent: SwapIntent, typed_data: serde_json::Value) -> String {
		let op_id = uuid::Uuid::new_v4().to_string();
		let op = PendingOperation {
			op_id: op_id.clone(),
			intent,
			typed_data,
			created_at: self.clock.now(),
			status: OperationStatus::AwaitingSignature,
			tx_hash: None,
			failure_reason: None,
		};

		self.ops.lock().unwrap().insert(op_id.clone(), op);
		op_id
	}

	pub fn get(&self, op_id: &str) -> Result<PendingOperation, StoreError> {
		self.ops
			.lock()
			.unwrap()
			.get(op_id)
			.cloned()
			.ok_or(StoreError::NotFound)
	}

	/// Claims the operation for submission.
	///
	/// Exactly one caller can move an entry from `AwaitingSignature` to
	/// `Submitting`; every other concurrent or later caller gets
	/// `Consumed`. Entries past their signing window flip to `Expired`
	/// here even if the reaper has not run yet.
	pub fn begin_submit(&self, op_id: &str) -> Result<PendingOperation, StoreError> {
		let mut ops = self.ops.lock().unwrap();
		let op = ops.get_mut(op_id).ok_or(StoreError::NotFound)?;

		match op.status {
			OperationStatus::AwaitingSignature => {}
			OperationStatus::Expired => return Err(StoreError::Expired),
			_ => return Err(StoreError::Consumed),
		}

		if self.clock.now() > self.expires_at(op) {
			op.status = OperationStatus::Expired;
			return Err(StoreError::Expired);
		}

		op.status = OperationStatus::Submitting;
		Ok(op.clone())
	}

	/// Rolls a claim back to `AwaitingSignature` so the client can retry.
	///
	/// Only valid from the transient `Submitting` state, and only for
	/// failures where nothing reached the chain; anything broadcast (or
	/// possibly broadcast) must go through a terminal transition instead.
	pub fn release(&self, op_id: &str) {
		if let Some(op) = self.ops.lock().unwrap().get_mut(op_id) {
			if op.status == OperationStatus::Submitting {
				op.status = OperationStatus::AwaitingSignature;
			}
		}
	}

	pub fn mark_submitted(&self, op_id: &str, tx_hash: B256) {
		if let Some(op) = self.ops.lock().unwrap().get_mut(op_id) {
			op.status = OperationStatus::Submitted;
			op.tx_hash = Some(tx_hash);
		}
	}

	pub fn mark_confirmed(&self, op_id: &str) {
		if let Some(op) = self.ops.lock().unwrap().get_mut(op_id) {
			op.status = OperationStatus::Confirmed;
		}
	}

	pub fn mark_failed(&self, op_id: &str, reason: &str) {
		if let Some(op) = self.ops.lock().unwrap().get_mut(op_id) {
			op.status = OperationStatus::Failed;
			op.failure_reason = Some(reason.to_string());
		}
	}

	/// Expires overdue entries and drops terminal ones past retention.
	/// Returns how many entries changed state or were removed.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let mut ops = self.ops.lock().unwrap();
		let mut touched = 0;

		for op in ops.values_mut() {
			if op.status == OperationStatus::AwaitingSignature && now > self.expires_at(op) {
				op.status = OperationStatus::Expired;
				touched += 1;
			}
		}

		let before = ops.len();
		ops.retain(|_, op| {
			!(op.status.is_terminal() && now > op.created_at + TERMINAL_RETENTION_SECS)
		});
		touched += before - ops.len();

		touched
	}

	/// The signing window: the relayer-side TTL, tightened to the
	/// intent's own deadline when that comes sooner.
	fn expires_at(&self, op: &PendingOperation) -> u64 {
		let ttl_deadline = op.created_at + self.ttl.as_secs();
		let intent_deadline = u64::try_from(op.intent.deadline).unwrap_or(u64::MAX);
		ttl_deadline.min(intent_deadline)
	}
}

/// Runs the reaper on a fixed interval until the process exits.
pub fn spawn_reaper(
	store: Arc<OperationStore>,
	interval: Duration,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let purged = store.purge_expired();
			if purged > 0 {
				debug!(purged, "Reaped expired operations");
			}
		}
	})
}
