pub mod alert;
pub mod catalog;
pub mod config;
pub mod finance;
pub mod geo;
pub mod migration;
pub mod output;
pub mod pricing;
pub mod resolver;
pub mod server;
