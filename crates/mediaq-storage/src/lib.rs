//! Result storage for the MediaQ pipeline.
//!
//! This crate provides:
//! - Stateless (local disk) and object-storage result delivery
//! - S3-compatible uploads through the AWS SDK
//! - File extension to content-type classification

pub mod config;
pub mod content_type;
pub mod error;
pub mod object_store;
pub mod resolver;

pub use config::{S3Config, StorageConfig};
pub use content_type::{content_type_for, OCTET_STREAM};
pub use error::{StorageError, StorageResult};
pub use object_store::{ObjectStore, S3Store};
pub use resolver::StorageResolver;
