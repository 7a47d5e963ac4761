//! quantrelay: client-side relay between a cloud job service and a local
//! backtest engine.
//!
//! The engine cannot talk to the cloud itself: it reads compressed job
//! descriptors from a watched input folder and drops result artifacts into
//! watched output folders. This agent closes the loop: it polls the cloud
//! for pending work, expands each descriptor into the per-unit documents
//! the engine expects, publishes them on disk, uploads the artifacts the
//! engine produces, and derives the fixed-parameter retest pass from
//! walk-forward optimization output.

pub mod cloud;
pub mod codec;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod expand;
pub mod logging;
pub mod names;
pub mod retest;
pub mod store;
pub mod watchers;
