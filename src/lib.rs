//! Propagation application library
//!
//! Application modules served by the `propagation-server` binary, and the
//! lifecycle that runs them.

pub mod lifecycle;
pub mod modules;

pub use lifecycle::run;
pub use modules::register_all;
