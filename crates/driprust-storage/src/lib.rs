//! DripRust Storage - PostgreSQL persistence for the drip engine
//!
//! This crate provides the row models, repository traits, and `sqlx`-backed
//! implementations used by the drip campaign engine.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
