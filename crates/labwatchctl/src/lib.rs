//! labwatchctl - command line client for labwatchd

pub mod client;
pub mod display;

pub use client::{default_url, LabwatchClient};
