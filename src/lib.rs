//! Solar Credit API Library
//!
//! Credit scoring for solar financing (energy bills and open finance), the
//! energy-token marketplace and ledger, and the SolBot generator-matching chat relay.
//!
//! # Modules
//!
//! - `api`: HTTP-facing handlers and router.
//! - `core`: Domain logic, models and errors.
//! - `integrations`: External service clients and data sources.
//! - `scoring`: Credit score formulas and policies.
//! - `ledger`: Token transfer validation and planning.
//! - `token_storage`: Transactional token ledger.
//! - `db_storage`: Bills, connections and credit analyses.
//! - `chat_stream`: SSE relay for the chat assistant.

pub mod api;
pub mod core;
pub mod integrations;

pub mod app;
pub mod auth;
pub mod chat_stream;
pub mod circuit_breaker;
pub mod config;
pub mod credit_sources;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod gateway_client;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod openapi;
pub mod roster;
pub mod scoring;
pub mod simulator;
pub mod solbot_handler;
pub mod terms;
pub mod token_handler;
pub mod token_storage;
pub mod validation;
