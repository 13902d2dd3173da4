//! Rate limiting implementations.

mod engine;

pub use engine::QuotaEngine;
