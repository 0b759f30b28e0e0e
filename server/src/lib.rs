pub mod api;
pub mod app;
pub mod core;
pub mod engine;
pub mod module;
pub mod plugins;
