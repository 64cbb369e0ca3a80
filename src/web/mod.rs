//! The web module for handling the Axum API.
//! This file declares the other files in this directory as sub-modules.

pub mod api;
pub mod client_ip;
pub mod cookie;
pub mod models;
pub mod rate_limit;
pub mod security_headers;
