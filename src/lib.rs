pub mod api;
pub mod auth;
pub mod capacity;
pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod money;
pub mod notifications;
pub mod server;
pub mod settlement;
