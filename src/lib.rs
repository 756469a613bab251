pub mod analysis;
pub mod config;
pub mod data_io;
pub mod grid;
pub mod math;
pub mod naming;
pub mod pipeline;
pub mod time_utils;

pub use time_utils::*;
