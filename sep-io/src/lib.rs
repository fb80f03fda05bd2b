//! SEP I/O and Platform Abstraction
//!
//! This crate provides network I/O and platform-specific abstractions:
//! the non-blocking UDP socket wrapper and timing utilities.

pub mod socket;
pub mod time;

pub use socket::{DatagramSocket, SocketError};
pub use time::{Clock, ManualClock, SystemClock, Timer, Timestamp};
