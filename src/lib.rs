pub mod api;
pub mod auth;
pub mod config;
pub mod document;
pub mod logging;
pub mod model;
