pub mod api;
pub mod blacklist;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod processors;
pub mod storage;
pub mod worker;
