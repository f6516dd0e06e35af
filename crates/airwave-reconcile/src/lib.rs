//! 目标存储层与“期望对象表”之间的同步

pub mod error;
pub mod reconciler;
pub mod store;

pub use error::{ReconcileError, Result};
pub use reconciler::{ConvergeReport, ReconcileConfig, Reconciler};
pub use store::{WantedObject, WantedStore};
