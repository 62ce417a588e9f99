use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{ByteStream, ContentStore, Error};

/// Filesystem-based content store.
///
/// Each file is stored at `{base_path}/{location}`. Parent directories are
/// created automatically.
pub struct FsContentStore {
  base_path: PathBuf,
}

impl FsContentStore {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn location_to_path(&self, location: &str) -> Result<PathBuf, Error> {
    let relative = Path::new(location);
    let escapes = location.is_empty()
      || relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
      return Err(Error::InvalidLocation(location.to_string()));
    }
    Ok(self.base_path.join(relative))
  }
}

fn not_found_or_io(location: &str) -> impl FnOnce(std::io::Error) -> Error + '_ {
  move |e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      Error::NotFound(location.to_string())
    } else {
      Error::Io(e)
    }
  }
}

#[async_trait]
impl ContentStore for FsContentStore {
  async fn get(&self, location: &str) -> Result<ByteStream, Error> {
    let path = self.location_to_path(location)?;
    let file = File::open(&path).await.map_err(not_found_or_io(location))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn put(&self, location: &str, data: ByteStream, _content_type: &str) -> Result<(), Error> {
    let path = self.location_to_path(location)?;

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(path).await?;
    let mut stream = std::pin::pin!(data);

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      file.write_all(&bytes).await?;
    }

    file.flush().await?;
    Ok(())
  }

  async fn delete(&self, location: &str) -> Result<(), Error> {
    let path = self.location_to_path(location)?;
    fs::remove_file(&path)
      .await
      .map_err(not_found_or_io(location))
  }
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;

  use super::*;
  use crate::{byte_stream, collect};

  #[tokio::test]
  async fn test_put_get_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsContentStore::new(dir.path());

    store
      .put(
        "Demonstration/abc/report.txt",
        byte_stream(Bytes::from_static(b"quarterly numbers")),
        "text/plain",
      )
      .await
      .unwrap();

    let content = collect(store.get("Demonstration/abc/report.txt").await.unwrap())
      .await
      .unwrap();
    assert_eq!(&content[..], b"quarterly numbers");

    store.delete("Demonstration/abc/report.txt").await.unwrap();
    let missing = store.get("Demonstration/abc/report.txt").await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
  }

  #[tokio::test]
  async fn test_rejects_escaping_location() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsContentStore::new(dir.path());

    let result = store.get("../outside").await;
    assert!(matches!(result, Err(Error::InvalidLocation(_))));

    let absolute = store.delete("/etc/passwd").await;
    assert!(matches!(absolute, Err(Error::InvalidLocation(_))));
  }
}
