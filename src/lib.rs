//! xr-bridge: backend-independent XR sessions, coordinate systems and anchors
//!
//! Re-exports the core runtime and its TOML configuration layer so
//! applications depend on a single crate.

pub use xr_bridge_config as config;
pub use xr_bridge_config::XrConfig;
pub use xr_bridge_core::*;
