//! # checkworker
//!
//! Background syntax-check worker. Connects back to a controller over TCP,
//! speaks a length-prefixed, Adler-32-checksummed JSON frame protocol,
//! dispatches check jobs to registered checker services, and fans batch jobs
//! out across a worker pool with streaming results and cooperative
//! cancellation.

pub mod batch;
pub mod checkers;
pub mod cli;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod service;
pub mod worker;
