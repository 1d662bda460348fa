#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod align;
pub mod data;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod summary;

#[path = "../sentiment/mod.rs"]
pub mod sentiment;

#[path = "../shared/config.rs"]
pub mod config;
