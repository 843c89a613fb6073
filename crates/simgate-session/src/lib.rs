//! Session orchestration between the host simulation loop and remote agent
//! clients.
//!
//! One primary connection is authoritative: it picks the spawn point, its
//! control commands drive the player, and losing it restarts the level.
//! Additional connections are best-effort observers that receive the same
//! per-tick broadcast but whose input is discarded. Every connection lives in
//! its own [`slot::ConnectionSlot`], the unit of fault isolation: a slot that
//! fails any protocol call goes dead and is skipped for the rest of the
//! session, without disturbing the others.

pub mod controller;
pub mod runtime;
pub mod scripted;
pub mod slot;

pub use controller::{SessionController, TickOutcome};
pub use scripted::{CallLog, CallRecord, Op, ScriptHandle, ScriptedFactory, ScriptedTransport};
pub use slot::{ConnectionSlot, SlotId};
