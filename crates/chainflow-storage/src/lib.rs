//! chainflow-storage: storage backends for Chainflow.
//!
//! Backends:
//! - [`cache`]: in-memory row cache implementing `CacheStore`
//! - [`entity`]: in-memory entity store implementing `EntityStore`
//! - [`fixture`]: JSON fixtures for seeding the in-memory cache

pub mod cache;
pub mod entity;
pub mod fixture;

pub use cache::InMemoryCache;
pub use entity::InMemoryEntityStore;
pub use fixture::{CacheFixture, ChainFixture, FixtureError};
