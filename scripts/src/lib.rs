//! Scripts for deploying, upgrading and verifying the Taco vault contracts,
//! tracking what was deployed in a deployment ledger.

#![deny(missing_docs)]

pub mod artifacts;
pub mod cli;
pub mod client;
pub mod commands;
pub mod constants;
pub mod deployer;
pub mod errors;
pub mod etherscan;
pub mod ledger;
pub mod plan;
mod solidity;
pub mod types;
pub mod upgrade;
pub mod utils;
pub mod verifier;
