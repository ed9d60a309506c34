//! Upstream client abstraction and implementations.
//!
//! This module contains:
//! - The `UpstreamClient` trait the orchestrator and calendar oracle call
//! - Concrete client implementations (Yahoo)

mod traits;

pub mod yahoo;

pub use traits::{UpstreamClient, DEFAULT_REFERENCE_SYMBOL};
