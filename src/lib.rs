pub mod cli;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod hotspot;
pub mod middleware;
pub mod services;
pub mod system;
pub mod tasks;
/// Scripted host and scratch config for driving the engine without a real host
pub mod testing;
pub mod types;

pub use engine::Engine;
