pub mod config;
pub mod io_struct;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod server;
pub mod stage;
pub mod stage_client;
