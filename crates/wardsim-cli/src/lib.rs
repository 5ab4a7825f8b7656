pub mod aws;
pub mod command;
pub mod config;
pub mod driver;
