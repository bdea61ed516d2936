//! Tracks how much time goes into each application and programming language, and lets you
//! name the stretches of work you did.
//!
//! [tracker] owns the recording state machine and the sampling loop, [aggregation] merges
//! samples into per-day buckets, [storage] persists buckets and finalized sessions.

pub mod aggregation;
pub mod cli;
pub mod fs;
pub mod storage;
pub mod tracker;
pub mod utils;
pub mod window_api;
