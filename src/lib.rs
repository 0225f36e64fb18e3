#![allow(clippy::new_without_default, clippy::len_without_is_empty)]

#[macro_use]
mod macros;
pub mod apply;
pub mod cli;
pub mod config;
pub mod dispc;
pub mod driver;
pub mod encoder;
pub mod irq;
pub mod logger;
pub mod pipe;
pub mod sim;
pub mod utils;
pub mod workqueue;
