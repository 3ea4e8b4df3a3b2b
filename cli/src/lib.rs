//! Command-line hosts for the requirement import toolkit.
//!
//! Both commands load [`config::Config`], initialise logging and hand a
//! [`transport::UreqTransport`] to the core workflows. The `run` functions
//! take the transport as a parameter so tests can point them at the mock
//! server or at a transport that must never be called.

pub mod config;
pub mod import;
pub mod logging;
pub mod refresh;
pub mod transport;
