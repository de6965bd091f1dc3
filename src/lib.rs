#![forbid(unsafe_code)]

pub mod article;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod formats;
pub mod keywords;
pub mod learning;
pub mod links;
pub mod logging;
pub mod maintenance;
pub mod page;
pub mod pagination;
pub mod safety;
pub mod scrape;
pub mod store;
pub mod strategy;
