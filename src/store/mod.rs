pub mod headlines;
pub mod snapshots;

pub use headlines::HeadlineStore;
pub use snapshots::SnapshotStore;
