//! Domain model for the Ken Burns batch converter.
//!
//! Pure, I/O-free building blocks shared by the HTTP client, the
//! scheduler, and the command-line front end: jobs and their status
//! machine, the effect catalog and assignment policy, the bounded
//! conversion queue, parameter parsing, and artifact naming.

pub mod effects;
pub mod error;
pub mod job;
pub mod naming;
pub mod params;
pub mod queue;
pub mod types;
