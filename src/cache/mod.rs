mod snapshot;

pub use snapshot::SnapshotCache;
