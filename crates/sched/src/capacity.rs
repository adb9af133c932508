//! Usable-capacity math over worker nodes.
//!
//! A worker's raw free capacity is shaved by a reservation policy before the
//! dispatcher may touch it: the primary node keeps a fixed floor free for
//! interactive use, rented secondary nodes keep a proportional slice. Pure
//! functions of observed state; in-flight commitments are subtracted by the
//! caller before dispatching.

use std::collections::HashMap;

use gleaner_core::WorkerNode;

/// Reservation policy applied when computing usable capacity.
#[derive(Debug, Clone, Copy)]
pub struct ReservePolicy {
    /// Units always left free on the primary node.
    pub primary_floor: f64,
    /// Fraction of free capacity left alone on secondary nodes.
    pub secondary_fraction: f64,
}

/// Capacity a worker may host after the reservation policy is applied.
///
/// Never negative; `0.0` means "cannot host any work".
pub fn usable_capacity(node: &WorkerNode, policy: &ReservePolicy) -> f64 {
    let free = node.total_capacity - node.used_capacity;
    let usable = if node.is_primary {
        free - policy.primary_floor
    } else {
        free * (1.0 - policy.secondary_fraction)
    };
    usable.max(0.0)
}

/// A worker's allocatable budget for one dispatch pass.
#[derive(Debug, Clone)]
pub struct WorkerCapacity {
    pub name: String,
    pub usable: f64,
}

/// Build the per-worker capacity snapshot for one cycle.
///
/// Applies the reservation policy, subtracts capacity already committed to
/// in-flight batches, and drops workers below `min_usable` (too small to
/// host even a trivial stage slice). Order follows the input order so the
/// dispatcher's greedy walk stays deterministic.
pub fn capacity_snapshot(
    nodes: &[WorkerNode],
    policy: &ReservePolicy,
    committed: &HashMap<String, f64>,
    min_usable: f64,
) -> Vec<WorkerCapacity> {
    nodes
        .iter()
        .filter_map(|node| {
            let reserved = usable_capacity(node, policy);
            let usable = (reserved - committed.get(&node.name).copied().unwrap_or(0.0)).max(0.0);
            if usable < min_usable {
                return None;
            }
            Some(WorkerCapacity {
                name: node.name.clone(),
                usable,
            })
        })
        .collect()
}
