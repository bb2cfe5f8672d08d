pub mod admin;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod enrollment;
pub mod errors;
pub mod identify;
pub mod output;
pub mod records;
