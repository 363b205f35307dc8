//! avp: inject secret-store values into Kubernetes manifests.

pub mod backends;
pub mod cli;
pub mod config;
pub mod generate;
pub mod kube;
pub mod logging;
