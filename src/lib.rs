pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fs_util;
pub mod manifest;
pub mod output;
pub mod params;
pub mod plan;
pub mod postprocess;
pub mod sources;
pub mod transfer;
pub mod validate;
