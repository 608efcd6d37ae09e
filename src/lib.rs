//! Library crate for spectrum-back: the survey sync engine, its storage
//! backends and the HTTP/SSE surface, exposed for binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
