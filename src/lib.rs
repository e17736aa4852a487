//! # Irradiance Node Library
//!
//! Solar irradiance field node: answers a polling LoRa gateway and uploads
//! batched averages over HTTP.
//!
//! This library provides the radio link protocol, the per-destination
//! telemetry accumulator, upload formatting, and the node context that runs
//! them together on one task.

pub mod config;
pub mod error;
pub mod link;
pub mod node;
pub mod radio;
pub mod sensors;
pub mod telemetry;
pub mod upload;
