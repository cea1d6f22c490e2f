pub mod channels;
pub mod command;
pub mod config;
pub mod consts;
pub mod discovery;
pub mod error;
pub mod filename;
pub mod geometry;
pub mod ledger;
pub mod metadata;
pub mod pipeline;
pub mod planner;
pub mod scheduler;
pub mod settings;
pub mod wait;
