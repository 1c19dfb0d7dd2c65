//! Core whalewatch library (config, logging, feed consumer, audio notifier).

pub mod audio;
pub mod config;
pub mod core;
pub mod feed;
pub mod logging;
