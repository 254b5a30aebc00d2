//! Typed representations of the packets the proxy inspects, answers or
//! rewrites. Everything else stays an opaque [`PacketFrame`] and is piped
//! through untouched.
//!
//! [`PacketFrame`]: crate::decode::PacketFrame

pub mod handshaking;
pub mod login;
pub mod play;
pub mod status;
