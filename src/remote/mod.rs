//! Remote Resource Client seams and an in-memory control plane.
//!
//! This module provides:
//! - The [`ResourceApi`] and [`PolicyApi`] traits the engine calls
//! - Wire payload types
//! - [`InMemoryApi`], a thread-safe simulation used by tests and dry runs

mod client;
mod memory;
mod types;

pub use client::{PolicyApi, ResourceApi};
#[cfg(test)]
pub use client::{MockPolicyApi, MockResourceApi};
pub use memory::{ApiCall, InMemoryApi};
pub use types::{CreatePayload, Policy, PolicyBinding, RemoteResource};
