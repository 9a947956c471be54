//! Library wrapper around the `jshare` CLI implementation.
//!
//! Compiling the binary crate root as a module lets `cargo test -p jshare-cli --lib`
//! typecheck the CLI without building the integration test suite.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
