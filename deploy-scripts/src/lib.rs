//! Scripts for deploying and upgrading the PredyPool protocol contracts.
//!
//! A deployment is driven by the [`catalog`]: an ordered list of tagged deploy
//! scripts whose steps declare the records they depend on. A tag selection is
//! resolved into a [`plan`] and validated against the network's
//! [`registry`] before the [`sequencer`] sends anything.

pub mod artifacts;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod commands;
pub mod constants;
pub mod errors;
pub mod network;
pub mod plan;
pub mod registry;
pub mod sequencer;
pub mod solidity;
pub mod types;
pub mod utils;
pub mod verify;
