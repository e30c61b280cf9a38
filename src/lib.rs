pub mod app;
pub mod builders;
pub mod config;
pub mod controller;
pub mod deployment;
pub mod events;
pub mod executor;
pub mod extract;
pub mod ids;
pub mod ledger;
pub mod parser;
pub mod poller;
pub mod rpc;
pub mod signer;
pub mod snapshot;
pub mod tiles;
pub mod turn;
pub mod ui;

pub mod test_helpers;
