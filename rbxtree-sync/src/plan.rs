//! Sync planner: closure over missing ancestors, then parent-before-child
//! ordering.
//!
//! 1. Every ancestor prefix of every operation path that is neither a root
//!    service nor the path of an explicit operation becomes a `Folder` stub.
//!    Stubs are sorted by path and appended after the inputs.
//! 2. Operations are ordered with Kahn's algorithm. Edges run from every
//!    operation at a parent path to each operation directly below it; ready
//!    operations leave in original index order.
//! 3. Anything never emitted (its parent is neither a root nor an operation)
//!    is appended in original order and listed in [`Plan::unresolved`].
//!
//! An explicit operation always wins over a stub: no stub is generated for a
//! path some operation already targets.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use rbxtree_core::{types::FOLDER_KIND, InstancePath, Operation, ServiceSet};

/// Ordered operations ready for dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub operations: Vec<Operation>,
    /// Stub paths added by the closure step, sorted.
    pub synthesized: Vec<InstancePath>,
    /// Paths whose parent never became available, in original order.
    pub unresolved: Vec<InstancePath>,
}

/// Close over missing ancestors and order `operations` for dispatch.
pub fn plan(operations: Vec<Operation>, services: &ServiceSet) -> Plan {
    let mut operations: Vec<Operation> = operations.into_iter().map(fill_inferred).collect();
    let synthesized = missing_ancestors(&operations, services);
    if !synthesized.is_empty() {
        tracing::info!("creating {} missing parent folder(s)", synthesized.len());
    }
    operations.extend(synthesized.iter().cloned().map(Operation::folder));

    let (operations, unresolved) = order(operations, services);
    Plan {
        operations,
        synthesized,
        unresolved,
    }
}

/// Fill in a missing kind (`Folder`) and name (last path segment).
/// Fields that are present are left alone.
pub fn fill_inferred(mut op: Operation) -> Operation {
    if op.data.kind.is_none() {
        op.data.kind = Some(FOLDER_KIND.to_string());
    }
    if op.data.name.is_none() {
        op.data.name = Some(op.path.leaf().to_string());
    }
    op
}

/// Ancestor prefixes that neither a root service nor an operation covers.
pub fn missing_ancestors(operations: &[Operation], services: &ServiceSet) -> Vec<InstancePath> {
    let explicit: HashSet<&InstancePath> = operations.iter().map(|op| &op.path).collect();
    let mut missing = BTreeSet::new();
    for op in operations {
        for ancestor in op.path.ancestors() {
            if !explicit.contains(&ancestor) && !services.is_root_path(&ancestor) {
                missing.insert(ancestor);
            }
        }
    }
    missing.into_iter().collect()
}

/// Order `operations` parent-before-child.
///
/// Returns the ordered operations (same length as the input) and the paths
/// that could not be placed after their parent.
pub fn order(
    operations: Vec<Operation>,
    services: &ServiceSet,
) -> (Vec<Operation>, Vec<InstancePath>) {
    let n = operations.len();
    let mut at_path: HashMap<&InstancePath, Vec<usize>> = HashMap::new();
    for (i, op) in operations.iter().enumerate() {
        at_path.entry(&op.path).or_default().push(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    let mut orphaned = vec![false; n];
    for (i, op) in operations.iter().enumerate() {
        let Some(parent) = op.path.parent() else {
            continue;
        };
        match at_path.get(&parent) {
            Some(parents) => {
                for &p in parents {
                    children[p].push(i);
                    indegree[i] += 1;
                }
            }
            None if services.is_root_path(&parent) => {}
            None => orphaned[i] = true,
        }
    }
    drop(at_path);

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| indegree[i] == 0 && !orphaned[i])
        .map(Reverse)
        .collect();
    let mut emitted = Vec::with_capacity(n);
    let mut done = vec![false; n];
    while let Some(Reverse(i)) = ready.pop() {
        done[i] = true;
        emitted.push(i);
        for &child in &children[i] {
            indegree[child] -= 1;
            if indegree[child] == 0 && !orphaned[child] {
                ready.push(Reverse(child));
            }
        }
    }

    let left: Vec<usize> = (0..n).filter(|&i| !done[i]).collect();
    let mut slots: Vec<Option<Operation>> = operations.into_iter().map(Some).collect();
    let unresolved: Vec<InstancePath> = left
        .iter()
        .filter_map(|&i| slots[i].as_ref().map(|op| op.path.clone()))
        .collect();
    if !unresolved.is_empty() {
        tracing::warn!(
            "{} operation(s) may have missing parents; sending them last",
            unresolved.len()
        );
        for path in unresolved.iter().take(20) {
            tracing::debug!("  unresolved: {path}");
        }
    }

    let ordered = emitted
        .into_iter()
        .chain(left)
        .filter_map(|i| slots[i].take())
        .collect();
    (ordered, unresolved)
}
