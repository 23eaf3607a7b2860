pub mod cli;
pub mod game;
pub mod metrics;
pub mod output;
pub mod server;
