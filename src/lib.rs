//! Authentication and session core for the notes service
//!
//! Password hashing, access tokens, server-side sessions, and identity
//! extraction for HTTP and gRPC.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod session;
pub mod telemetry;
