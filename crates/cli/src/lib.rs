//! Command-line front end for the siteforge build engine: source scanning
//! and the built-in writer plugin, shared by the binary and the
//! integration tests.

pub mod plugins;
pub mod scan;
