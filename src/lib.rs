//! Lead Qualification Pipeline Library
//!
//! This library provides the core functionality for the lead qualification
//! pipeline: enrichment planning and providers, ICP fit scoring, three-pass
//! email verification, and the orchestrator that drives a lead through
//! enrich -> score -> verify -> qualify against an ICP.
//!
//! # Modules
//!
//! - `activity`: Per-assignment audit trail.
//! - `cache`: Read-through enrichment cache.
//! - `circuit_breaker`: Circuit breaker for the mailbox validation provider.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Storage trait and Postgres implementation.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `icp`: ICP configuration types.
//! - `models`: Core data models and the assignment state machine.
//! - `pipeline`: Pipeline orchestrator.
//! - `scoring`: ICP fit scoring engine.
//! - `services`: External provider clients.
//! - `strategy`: Enrichment strategy planner.
//! - `verification`: Three-pass email verification cascade.

pub mod activity;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod icp;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod services;
pub mod strategy;
pub mod verification;
