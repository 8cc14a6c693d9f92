//! `MentorChat` — real-time chat synchronization client library.

pub mod ack;
pub mod config;
pub mod render;
pub mod room;
pub mod session;
pub mod transcript;
pub mod transport;
