//! # Marker Core
//!
//! The domain layer of the Marker quota service.
//! This crate holds the limit policy, quota decisions and the ports that
//! infrastructure implements; it has no infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::QuotaExceeded;
