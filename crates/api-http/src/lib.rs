//! HTTP API Layer
//!
//! REST surface over the backup orchestrator: `POST/GET /backups` and
//! `GET/DELETE /backups/:id`.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{router, HttpServer, HttpServerConfig, ServerHandle};
