//! API route handlers

pub mod health;
pub mod module_config;
pub mod modules;
pub mod pull;
pub mod stat;
