pub mod config;
pub mod evaluate;
pub mod memory;
pub mod run_loop;
