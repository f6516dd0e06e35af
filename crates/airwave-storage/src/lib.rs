pub mod backend;
pub mod error;
pub mod registry;

pub use backend::{
    BackendStats, BlobStore, LocalBackend, ObjectMeta, ObjectStoreBackend, ReplicatedBackend,
    S3Endpoint,
};
pub use error::{Result, StorageError};
pub use registry::{BackendConfig, BackendKind, BackendRegistry, StorageConfig};
