//! Configuration layers: the built-in `default.toml`, an optional
//! user config file, and finally command-line flags.

pub mod file;
pub mod options;
