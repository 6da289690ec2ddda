include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod commands;
pub mod console;
pub mod constants;
pub mod core;
pub mod models;
pub mod platform;
pub mod settings;
