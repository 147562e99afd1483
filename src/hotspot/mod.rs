//! Host-facing components that turn a hotspot record into a running
//! access point: interface discovery, artifact materialization, process
//! control, status verification and per-hotspot leases.

pub mod controller;
pub mod discovery;
pub mod error;
pub mod lease;
pub mod materializer;
pub mod verifier;

pub use controller::{ControlOutcome, ControlStrategy, ProcessController};
pub use discovery::{Interface, InterfaceDiscoverer, InterfaceReport};
pub use error::OrchestrationError;
pub use lease::{HotspotLease, HotspotLeases};
pub use materializer::{ConfigMaterializer, EnvFile, SubnetPlan};
pub use verifier::StatusVerifier;
