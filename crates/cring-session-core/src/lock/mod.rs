//! Session lock coordination.
//!
//! `SessionLock` decides whether protected content may be shown. It moves
//! between three states:
//!
//! - `Unlocked`: no active lock record
//! - `PendingEntry`: a gated action is waiting on the password prompt
//! - `Locked`: an unexpired lock record masks protected content until its
//!   deadline, when a fresh token is fetched and the lock is lifted

pub mod coordinator;

pub use coordinator::{Access, LockState, SessionLock};
