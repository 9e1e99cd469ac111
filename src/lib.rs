//! Tracks which window has focus, sorts every switch into a category using simple title rules
//! and reports how the time was split between categories.
//!

pub mod cli;
pub mod engine;
pub mod utils;
pub mod window_api;
