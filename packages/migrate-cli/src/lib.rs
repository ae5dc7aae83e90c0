//! One-shot dotCMS database migration: MySQL -> PostgreSQL.
//!
//! Orchestrates a fixed set of disposable docker compose services (MySQL,
//! Postgres, OpenSearch, dotCMS itself, and pgloader), gates each phase on a
//! readiness probe, and applies the hand-curated SQL corrections that the
//! automated schema conversion needs around identifier and type mismatches.

pub mod cmd_builder;
pub mod compose;
pub mod config;
pub mod corrections;
pub mod env;
pub mod error;
pub mod fixups;
pub mod poll;
pub mod probes;
pub mod runtime;
pub mod sequencer;
