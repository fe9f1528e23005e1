//! Home Assistant Built-in Components
//!
//! This crate contains native Rust implementations of integrations that
//! don't require Python.
//!
//! - [`redfish_power`] - power consumption of servers with a Redfish BMC

pub mod redfish_power;
