//! Command-line front end for the image-to-video conversion queue.
//!
//! Loads images from disk, feeds them to the
//! [`Scheduler`](kenburns_pipeline::Scheduler) and writes finished clips to
//! the output directory.

pub mod config;
pub mod input;
pub mod sink;
