// src/core/mod.rs

pub mod arguments;
pub mod command;
pub mod constraints;
pub mod context;
pub mod cooldown;
pub mod engine;
pub mod events;
pub mod loader;
pub mod manifest;
pub mod optimizer;
pub mod registry;
pub mod resolvers;
pub mod tokenizer;
pub mod undo;
