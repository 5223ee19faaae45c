//! # Planboard API Server Library
//!
//! HTTP layer of Planboard: routing, middleware, request validation and
//! error translation on top of `planboard-shared`.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Extractors that reject with the unified error body
//! - `middleware`: Authentication, rate limiting and security headers
//! - `openapi`: OpenAPI document
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod openapi;
pub mod routes;
