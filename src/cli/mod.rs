//! 命令行入口，所有命令都驱动同一个 `SponsorService`。

mod runner;

pub mod args;
pub mod commands;
pub mod context;

pub use runner::run;
