//! Shared primitives for the tender engine.
//!
//! Storage plumbing, the error taxonomy, configuration and the generic
//! lifecycle/history machinery live here; subsystems under `plugins/` build
//! their operations on top of them.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod model;
pub mod output;
pub mod pool;
pub mod schemas;
pub mod store;
pub mod time;
pub mod validate;
