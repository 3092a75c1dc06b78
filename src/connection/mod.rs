//! Connection Module
//!
//! Per-client state for the reactor-driven server. Nothing in here blocks:
//! every socket operation that would block reports
//! [`SessionStatus::Progress`] and control goes back to the reactor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Reactor (server)                        │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ readable / writable
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Session                                │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ RingBuffer  │───>│   Frame     │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Reply bytes │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **RingBuffer**: fixed-capacity inbound buffer, one per connection
//! - **Session**: read / execute / write state machine
//! - **Statistics**: process-wide atomic counters

pub mod buffer;
pub mod session;
pub mod stats;

// Re-export commonly used types
pub use buffer::RingBuffer;
pub use session::{Session, SessionStatus};
pub use stats::ConnectionStats;
