//! Casework Content
//!
//! Storage for the bytes behind file values and file attachments. Instances
//! only record a file's metadata and its storage `location`; the bytes are
//! streamed here when a multipart submission is decoded.
//!
//! The [`ContentStore`] trait uses async streaming so large uploads never need
//! to sit in memory whole.

mod fs;

pub use fs::FsContentStore;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for content data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for content storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested content was not found.
  #[error("content not found: {0}")]
  NotFound(String),

  /// The location would resolve outside the store.
  #[error("invalid content location: {0}")]
  InvalidLocation(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Content storage trait.
#[async_trait]
pub trait ContentStore: Send + Sync {
  /// Retrieve content by location.
  async fn get(&self, location: &str) -> Result<ByteStream, Error>;

  /// Store content at a location, replacing anything already there.
  async fn put(&self, location: &str, data: ByteStream, content_type: &str) -> Result<(), Error>;

  /// Delete content by location.
  async fn delete(&self, location: &str) -> Result<(), Error>;
}

/// Wrap an in-memory buffer as a stream.
pub fn byte_stream(bytes: Bytes) -> ByteStream {
  Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

/// Drain a stream into one buffer.
pub async fn collect(mut stream: ByteStream) -> Result<Bytes, Error> {
  let mut buffer = BytesMut::new();
  while let Some(chunk) = stream.next().await {
    buffer.extend_from_slice(&chunk?);
  }
  Ok(buffer.freeze())
}
