pub mod commands;
pub mod common;
pub mod configs;
pub mod engine;
pub mod orchestrator;
pub mod player;
pub mod protocol;
