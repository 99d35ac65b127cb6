//! Instance graph derived from a flat instance list.
//!
//! Roots are instances with no resolvable parent whose name is a known
//! service. Instances that cannot be reached from a root are collected in
//! [`InstanceGraph::unreachable`] so callers can report the loss.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{Instance, InstanceId, InstancePath};

/// Top-level containers that always exist on the host.
pub const DEFAULT_SERVICES: [&str; 14] = [
    "Workspace",
    "ReplicatedStorage",
    "ReplicatedFirst",
    "ServerScriptService",
    "ServerStorage",
    "StarterGui",
    "StarterPack",
    "StarterPlayer",
    "Lighting",
    "SoundService",
    "Teams",
    "Chat",
    "LocalizationService",
    "TestService",
];

/// Fixed set of root service names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceSet(HashSet<String>);

impl Default for ServiceSet {
    fn default() -> Self {
        Self(DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect())
    }
}

impl ServiceSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// A path is a known root when it is a single service segment.
    pub fn is_root_path(&self, path: &InstancePath) -> bool {
        path.depth() == 1 && self.contains(path.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parent/child view over a borrowed instance slice.
#[derive(Debug)]
pub struct InstanceGraph<'a> {
    instances: &'a [Instance],
    by_id: HashMap<&'a InstanceId, usize>,
    children: HashMap<&'a InstanceId, Vec<usize>>,
    roots: Vec<usize>,
    unreachable: Vec<usize>,
}

impl<'a> InstanceGraph<'a> {
    pub fn build(instances: &'a [Instance], services: &ServiceSet) -> Self {
        let mut by_id = HashMap::new();
        for (i, inst) in instances.iter().enumerate() {
            if let Some(id) = &inst.id {
                by_id.insert(id, i);
            }
        }

        let mut children: HashMap<&InstanceId, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (i, inst) in instances.iter().enumerate() {
            match inst.parent_id.as_ref().filter(|p| by_id.contains_key(p)) {
                Some(parent) => children.entry(parent).or_default().push(i),
                None if services.contains(&inst.name) => roots.push(i),
                None => {}
            }
        }

        let mut graph = Self {
            instances,
            by_id,
            children,
            roots,
            unreachable: Vec::new(),
        };
        graph.unreachable = graph.collect_unreachable();
        if !graph.unreachable.is_empty() {
            tracing::warn!(
                "{} instance(s) have no path to a root service and will not be materialized",
                graph.unreachable.len()
            );
        }
        graph
    }

    fn collect_unreachable(&self) -> Vec<usize> {
        let mut reached = vec![false; self.instances.len()];
        let mut stack: Vec<usize> = self.roots.clone();
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut reached[i], true) {
                continue;
            }
            stack.extend(self.children_indices(i).iter().copied());
        }
        reached
            .iter()
            .enumerate()
            .filter(|(_, r)| !**r)
            .map(|(i, _)| i)
            .collect()
    }

    fn children_indices(&self, i: usize) -> &[usize] {
        self.instances[i]
            .id
            .as_ref()
            .and_then(|id| self.children.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn instances(&self) -> &'a [Instance] {
        self.instances
    }

    pub fn get(&self, id: &InstanceId) -> Option<&'a Instance> {
        self.by_id.get(id).map(|&i| &self.instances[i])
    }

    pub fn roots(&self) -> impl Iterator<Item = (usize, &'a Instance)> + '_ {
        self.roots.iter().map(|&i| (i, &self.instances[i]))
    }

    /// Children of the instance at `index`, in discovery order.
    pub fn children_of(&self, index: usize) -> impl Iterator<Item = (usize, &'a Instance)> + '_ {
        self.children_indices(index)
            .iter()
            .map(|&i| (i, &self.instances[i]))
    }

    pub fn has_children(&self, index: usize) -> bool {
        !self.children_indices(index).is_empty()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Instances with no chain of resolvable parents up to a root service.
    pub fn unreachable(&self) -> impl Iterator<Item = &'a Instance> + '_ {
        self.unreachable.iter().map(|&i| &self.instances[i])
    }

    pub fn unreachable_count(&self) -> usize {
        self.unreachable.len()
    }

    /// Dotted path of every reachable instance, parents before children.
    pub fn paths(&self) -> Vec<(InstancePath, &'a Instance)> {
        let mut out = Vec::new();
        let mut visited = vec![false; self.instances.len()];
        for (i, root) in self.roots() {
            self.walk_paths(i, InstancePath::from(root.name.as_str()), &mut visited, &mut out);
        }
        out
    }

    fn walk_paths(
        &self,
        index: usize,
        path: InstancePath,
        visited: &mut [bool],
        out: &mut Vec<(InstancePath, &'a Instance)>,
    ) {
        if std::mem::replace(&mut visited[index], true) {
            return;
        }
        out.push((path.clone(), &self.instances[index]));
        for (child, inst) in self.children_of(index) {
            self.walk_paths(child, path.child(&inst.name), visited, out);
        }
    }
}
