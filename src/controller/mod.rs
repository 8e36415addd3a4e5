//! Controller module for Service LoadBalancer reconciliation
//! This module contains the main controller loop, the per-Service apply and
//! release passes and finalizer handling.

pub mod applier;
mod finalizers;
mod reconciler;

pub use finalizers::SERVICE_FINALIZER;
pub use reconciler::{retry_after, run_controller, ControllerState, FamilyKind, NLB_CLASS};
