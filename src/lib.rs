pub mod api;
pub mod bootstrap;
pub mod broker;
pub mod common;
pub mod config;
pub mod database;
pub mod engine;
