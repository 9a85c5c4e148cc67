//! blerelay: BLE temperature/status GATT peripheral and central-to-peripheral
//! relay.
//!
//! The protocol core (attribute table, access dispatcher, connection router,
//! relay discovery) is plain synchronous code with no hardware dependency
//! and is tested on the host:
//!
//! Usage: `cargo test --lib` (or `cargo test` for the integration tests too)
//!
//! The firmware binaries enable the `embedded` feature, which adds the
//! SoftDevice S140 adapter in [`softdevice`] on top of the same core.

#![cfg_attr(not(test), no_std)]

// This must go FIRST so that all the other modules see its macros.
#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod indicator;
pub mod peripheral;
pub mod relay;
pub mod sensor;

#[cfg(feature = "embedded")]
pub mod softdevice;

pub use error::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests - GATT behaviour seen by a peer
// ═══════════════════════════════════════════════════════════════════════════
