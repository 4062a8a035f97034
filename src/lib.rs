//! # loglens
//!
//! Ask natural-language questions about a live log file.
//!
//! A background ingester keeps a vector index of the log's lines up to date
//! (startup gap-fill, then live tailing). Questions are embedded, optionally
//! narrowed to a time window spotted in the wording ("last hour", "today",
//! "last week"), matched against the index, and the top lines are handed to
//! a language model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  log file  │──▶│ gap-fill + tail  │──▶│  SQLite  │
//! │ (appended) │   │ hash·stamp·embed │   │ vectors  │
//! └────────────┘   └──────────────────┘   └────┬─────┘
//!                                              │
//!                       ┌──────────────────────┤
//!                       ▼                      ▼
//!                 ┌──────────┐           ┌──────────┐
//!                 │   CLI    │           │   HTTP   │
//!                 │ ask/chat │           │ /ask ... │
//!                 └──────────┘           └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! loglens init                          # create database and log file
//! loglens watch                         # ingest continuously
//! loglens ask "what failed in the last hour?"
//! loglens serve                         # HTTP API + background ingest
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing, tracing setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model clients |
//! | [`logfile`] | Log file reading helpers |
//! | [`gap_fill`] | Startup catch-up |
//! | [`tail`] | Live tailing |
//! | [`service`] | Supervised background ingester |
//! | [`ask`] | Question answering and chat |
//! | [`server`] | HTTP API |
//! | [`generate`] | Synthetic log writer for demos |
//!
//! Pure logic (line identity, timestamps, time phrases, retrieval, prompts)
//! lives in the `loglens-core` crate.

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod gap_fill;
pub mod generate;
pub mod ingest;
pub mod llm;
pub mod logfile;
pub mod migrate;
pub mod search;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod tail;
