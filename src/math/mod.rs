pub mod interpolate;
pub mod stats;

#[cfg(test)]
mod tests;

pub use interpolate::*;
pub use stats::*;
