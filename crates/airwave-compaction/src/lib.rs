pub mod archive;
pub mod bucket;
pub mod compactor;
pub mod error;
pub mod schedule;

pub use bucket::{classify, Classification, ClassifyPolicy, TimeBucket};
pub use compactor::{CompactionConfig, CompactionReport, Compactor};
pub use error::{CompactionError, Result};
pub use schedule::LiveSchedule;
