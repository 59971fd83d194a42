pub mod catalog;
pub mod config;
pub mod platform;
pub mod protocol;
