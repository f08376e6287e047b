//! demoforge: recipe execution engine for demo and package environments.
//!
//! A recipe is compiled into an ordered plan of actions, each driving the
//! platform CLI. Every layer reports into one result tree whose failures
//! bubble up with a provenance trail.

pub mod actions;
pub mod cli;
pub mod config;
pub mod core;
pub mod transport;

#[cfg(test)]
mod testing;
