//! Business logic services.
//!
//! Services contain the collection job and everything that drives it,
//! separated from HTTP handlers.

pub mod collection_service;
pub mod collection_store;
pub mod run_service;
pub mod scheduler;

#[cfg(test)]
pub mod fakes;
