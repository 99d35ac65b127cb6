//! Record index: producer-ordered instances plus by-id and by-kind views.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Instance, InstanceId};

/// Deduplicating index over flat instance records.
///
/// Every inserted record is kept in [`RecordIndex::records`]; the by-id view
/// retains only the last record seen for each id.
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    records: Vec<Instance>,
    by_id: HashMap<InstanceId, usize>,
    by_kind: BTreeMap<String, usize>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: Instance) {
        let position = self.records.len();
        if let Some(id) = &instance.id {
            if self.by_id.insert(id.clone(), position).is_some() {
                tracing::debug!("duplicate referenceId {id}; by-id view keeps the later record");
            }
        }
        *self.by_kind.entry(instance.kind.clone()).or_insert(0) += 1;
        self.records.push(instance);
    }

    pub fn extend<I: IntoIterator<Item = Instance>>(&mut self, instances: I) {
        for instance in instances {
            self.insert(instance);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in producer order, duplicates included.
    pub fn records(&self) -> &[Instance] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Instance> {
        self.records
    }

    /// Last record seen with `id`.
    pub fn get(&self, id: &InstanceId) -> Option<&Instance> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    pub fn unique_ids(&self) -> usize {
        self.by_id.len()
    }

    pub fn kind_counts(&self) -> &BTreeMap<String, usize> {
        &self.by_kind
    }

    /// Number of distinct kinds.
    pub fn kind_count(&self) -> usize {
        self.by_kind.len()
    }

    /// Most frequent kinds, count descending then name ascending.
    pub fn top_kinds(&self, n: usize) -> Vec<(&str, usize)> {
        let mut kinds: Vec<(&str, usize)> = self
            .by_kind
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        kinds.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        kinds.truncate(n);
        kinds
    }
}

impl FromIterator<Instance> for RecordIndex {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        let mut index = RecordIndex::new();
        index.extend(iter);
        index
    }
}
