//! REST API server: multipart upload, batch extraction, zip download.

pub mod archive;
pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
