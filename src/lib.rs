pub mod api;
pub mod config;
pub mod console;
pub mod errors;
pub mod events;
pub mod models;
pub mod service;
pub mod state;
pub mod stream;
