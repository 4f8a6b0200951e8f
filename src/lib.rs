pub mod api;
pub mod config;
pub mod humanize;
pub mod media;
pub mod observability;
pub mod queue;
pub mod search;
pub mod worker;
