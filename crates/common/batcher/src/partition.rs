use crate::batchable::Batchable;
use std::collections::BTreeMap;

/// The events of a flushed batch, grouped by partition key.
///
/// Inside a partition, events are kept in arrival order.
/// Partitions are iterated in key order.
#[derive(Debug)]
pub struct PartitionedBatch<B: Batchable> {
    partitions: BTreeMap<B::Key, Vec<B>>,
}

impl<B: Batchable> PartitionedBatch<B> {
    pub fn new(batch: Vec<B>) -> Self {
        let mut partitions: BTreeMap<B::Key, Vec<B>> = BTreeMap::new();
        for event in batch {
            match partitions.get_mut(event.key()) {
                Some(partition) => partition.push(event),
                None => {
                    partitions.insert(event.key().clone(), vec![event]);
                }
            }
        }

        PartitionedBatch { partitions }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &B::Key> {
        self.partitions.keys()
    }

    pub fn get(&self, key: &B::Key) -> Option<&[B]> {
        self.partitions.get(key).map(Vec::as_slice)
    }
}

impl<B: Batchable> IntoIterator for PartitionedBatch<B> {
    type Item = (B::Key, Vec<B>);
    type IntoIter = std::collections::btree_map::IntoIter<B::Key, Vec<B>>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

impl<B: Batchable> From<Vec<B>> for PartitionedBatch<B> {
    fn from(batch: Vec<B>) -> Self {
        PartitionedBatch::new(batch)
    }
}
