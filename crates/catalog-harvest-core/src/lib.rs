//! # Catalog Harvest Core
//!
//! Storage-agnostic building blocks for catalog-harvest: harvest source
//! snapshots, catalog records, the [`store::CatalogStore`] abstraction and
//! the per-run outcome accounting in [`result`].
//!
//! This crate contains no sqlx, tokio, or filesystem traversal code. The
//! in-memory store in [`store::memory`] backs the pipeline tests.

pub mod models;
pub mod result;
pub mod store;
