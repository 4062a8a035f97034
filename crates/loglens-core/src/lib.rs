//! # loglens core
//!
//! Shared, I/O-free logic for loglens: log line identity, timestamp
//! extraction, time-intent parsing, the vector store abstraction, and the
//! retrieval algorithm that turns a question into a context blob.
//!
//! This crate contains no tokio, sqlx, or filesystem code. The `loglens`
//! application crate supplies concrete embedders, a SQLite store, and the
//! file tailing pipeline.

pub mod embedding;
pub mod identity;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod store;
pub mod time_intent;
pub mod timestamp;
