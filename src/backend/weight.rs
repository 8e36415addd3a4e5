//! Backend weight distribution
//!
//! Both algorithms are pure: they take a backend slice and return a new
//! vector with weights assigned. Under the Local policy one entry is passed
//! per pod, so a node hosting three pods appears three times and receives a
//! proportionally larger weight before duplicates are collapsed.

use std::collections::HashMap;

use crate::model::{Backend, TrafficPolicy, DEFAULT_SERVER_WEIGHT};

const MAX_WEIGHT: i32 = 100;

/// Assign weights according to the traffic policy and optional override
pub fn apply(policy: TrafficPolicy, backends: &[Backend], weight: Option<i32>) -> Vec<Backend> {
    match weight {
        None => pod_number(policy, backends),
        Some(w) => pod_percent(policy, backends, w),
    }
}

/// No override: fixed weight, or pods-per-server for Local
pub fn pod_number(policy: TrafficPolicy, backends: &[Backend]) -> Vec<Backend> {
    match policy {
        TrafficPolicy::Eni | TrafficPolicy::Cluster => backends
            .iter()
            .map(|b| with_weight(b, DEFAULT_SERVER_WEIGHT))
            .collect(),
        TrafficPolicy::Local => {
            let pods = pods_per_server(backends);
            backends
                .iter()
                .map(|b| with_weight(b, pods[&b.identity().0] as i32))
                .collect()
        }
    }
}

/// Override `weight` is spread over the backends
pub fn pod_percent(policy: TrafficPolicy, backends: &[Backend], weight: i32) -> Vec<Backend> {
    if backends.is_empty() {
        return Vec::new();
    }
    if weight == 0 {
        return backends.iter().map(|b| with_weight(b, 0)).collect();
    }

    let total = backends.len() as i64;
    match policy {
        TrafficPolicy::Eni | TrafficPolicy::Cluster => {
            let per_backend = (weight as i64 / total) as i32;
            backends
                .iter()
                .map(|b| with_weight(b, per_backend.max(1)))
                .collect()
        }
        TrafficPolicy::Local => {
            let pods = pods_per_server(backends);
            backends
                .iter()
                .map(|b| {
                    let share = weight as i64 * pods[&b.identity().0] as i64 / total;
                    with_weight(b, (share as i32).max(1))
                })
                .collect()
        }
    }
}

/// Collapse entries registering the same server and port, keeping the first
pub fn dedup(backends: Vec<Backend>) -> Vec<Backend> {
    let mut seen = std::collections::HashSet::new();
    backends
        .into_iter()
        .filter(|b| seen.insert(b.identity()))
        .collect()
}

fn pods_per_server(backends: &[Backend]) -> HashMap<String, usize> {
    let mut pods = HashMap::new();
    for b in backends {
        *pods.entry(b.identity().0).or_insert(0) += 1;
    }
    pods
}

fn with_weight(backend: &Backend, weight: i32) -> Backend {
    Backend {
        weight: weight.clamp(0, MAX_WEIGHT),
        ..backend.clone()
    }
}
