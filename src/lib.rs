//! cloud-lb-controller: Service LoadBalancer reconciliation for Kubernetes
//!
//! This crate turns `type: LoadBalancer` Services into classic (CLB) and
//! network (NLB) load balancers: listeners per Service port, backend groups
//! built from nodes or pod ENIs, and ownership tracked through names and
//! descriptions.

pub mod annotation;
pub mod backend;
pub mod builder;
pub mod cloud;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod listener;
pub mod manager;
pub mod model;
pub mod render;

#[cfg(test)]
mod test_fixtures;

pub use crate::error::{Error, Result};
