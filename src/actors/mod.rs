//! Actor-based scheduling
//!
//! The poll loop runs as an independent task owning the [`Engine`](crate::engine::Engine)
//! and is controlled through a cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!   SchedulerHandle ──(mpsc: CheckNow, UpdateInterval)──▶ SchedulerActor
//!         │                                                   │
//!         ├──(CancellationToken: shutdown)────────────────────▶│
//!         │                                                   │
//!         ◀──(watch: idle / probing)───────────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for cycle reports
//! 3. **State**: a watch channel publishing the current scheduler state
//!
//! The status snapshot and the log store are shared directly (behind their
//! own locks) with readers such as the [`Console`](crate::console::Console).

pub mod messages;
pub mod scheduler;
