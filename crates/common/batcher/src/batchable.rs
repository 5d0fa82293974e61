/// Implement this trait on items that can be batched.
///
/// The key is used to group the events of a flushed batch into partitions,
/// each partition being delivered as a unit.
pub trait Batchable: Send + 'static {
    /// The partition a batchable item belongs to.
    type Key: Ord + Clone + Send;

    /// The partition key of this item.
    fn key(&self) -> &Self::Key;
}
