pub mod check;
pub mod config;
pub mod install;
pub mod self_update;
pub mod update;
