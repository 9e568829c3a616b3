pub mod ai;
pub mod backend;
pub mod branch;
pub mod comments;
pub mod config;
pub mod error;
pub mod git;
pub mod hosting;
pub mod http;
pub mod sanitize;
pub mod workflow;
