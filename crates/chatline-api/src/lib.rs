pub mod admin;
pub mod ai;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod form;
pub mod gateway;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod tokens;
