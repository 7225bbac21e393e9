//! Simple to use cli/daemon for counting your keystrokes throughout the day.
//! The daemon observes global key presses and keeps sliding-window counts
//! (last minute, hour and day plus a 7-day history); the cli reads them back
//! without any runtime dependency on the daemon.
//!

pub mod cli;
pub mod daemon;
pub mod input_api;
pub mod utils;
