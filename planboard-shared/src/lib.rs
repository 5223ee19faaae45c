//! # Planboard Shared Library
//!
//! This crate contains the domain types, persistence and security primitives
//! used by the Planboard API server.
//!
//! ## Module Organization
//!
//! - `auth`: Password hashing, JWT, request auth context and role-scoped visibility
//! - `db`: Connection pool and migrations
//! - `models`: Database models and their queries
//! - `ordering`: Dense ordering planner for Kanban columns and cards
//! - `pagination`: Page requests and paginated responses

pub mod auth;
pub mod db;
pub mod models;
pub mod ordering;
pub mod pagination;

/// Current version of the Planboard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
