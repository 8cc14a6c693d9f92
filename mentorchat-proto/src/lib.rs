//! Shared protocol definitions for the `MentorChat` wire format.

pub mod channel;
pub mod codec;
pub mod message;
pub mod rest;
