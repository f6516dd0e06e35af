pub mod error;
pub mod fetcher;
pub mod ingestor;
pub mod playlist;
pub mod state;
pub mod transcoder;

pub use error::{IngestError, Result};
pub use fetcher::{HttpFetcher, MediaFetcher};
pub use ingestor::{ChannelConfig, IngestConfig, IngestContext, IngestState, SegmentIngestor};
pub use playlist::{segment_identity, Playlist};
pub use state::{AlertRateLimiter, DailyCompletion};
pub use transcoder::{FfmpegConfig, FfmpegTranscoder, PassthroughTranscoder, Transcoder};
