// Library exports for the Rebound self-healing supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod probe;
pub mod process;
pub mod state;
pub mod supervisor;
