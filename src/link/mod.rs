//! # Radio Link Module
//!
//! Implementation of the gateway-polled radio link.
//!
//! This module handles:
//! - Packet framing (4-byte header + ASCII payload)
//! - Decoding inbound frames without interpreting payloads
//! - The request / ACK / data / ACK exchange with the gateway

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod session;

pub use session::{ExchangeOutcome, LinkSession, LinkSettings};
