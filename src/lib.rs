#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod compose;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod feed;
pub mod graphics;
pub mod logging;
pub mod markup;
pub mod media;
pub mod navigator;
pub mod picker;
pub mod quote;
pub mod search;
pub mod ui;
pub mod video;
pub mod window;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
