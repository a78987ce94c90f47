pub mod filter;
pub mod headline;
pub mod stats;
pub mod summary;
pub mod ticker;

pub use filter::ExclusionFilter;
pub use headline::{Headline, HeadlineBundle, Section};
pub use stats::{RedisStatistics, SnapshotDescriptor};
pub use summary::{SummaryIssue, SummaryKind, SummaryRecord};
pub use ticker::build_ticker_text;
