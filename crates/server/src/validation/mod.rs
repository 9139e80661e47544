//! Input validation shared across endpoints.

pub mod server_name;
