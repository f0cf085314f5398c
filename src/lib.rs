//! Photo storage backend
//!
//! Registration and login, photo upload and listing, text and image search
//! through an external inference service, and the asynchronous pipeline that
//! gets every uploaded photo embedded and reports per-batch progress.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
