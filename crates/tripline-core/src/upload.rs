//! Object store uploads via OpenDAL.
//!
//! Failures never cross the [`Uploader`] boundary: they are logged and
//! reported as `false`, so the caller only decides whether the local copy is
//! safe to delete.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use opendal::Operator;

use crate::fetch::SHARED_RUNTIME;

/// Upload chunk size (8MB)
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Destination of one object: bucket plus path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteObjectRef {
    pub bucket: String,
    pub path: String,
}

impl RemoteObjectRef {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for RemoteObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Pushes a local file to a remote object.
///
/// Returns `true` only once the store acknowledged the complete write.
pub trait Uploader {
    fn upload(&self, local_path: &Path, destination: &RemoteObjectRef) -> bool;
}

impl<T: Uploader + ?Sized> Uploader for &T {
    fn upload(&self, local_path: &Path, destination: &RemoteObjectRef) -> bool {
        (**self).upload(local_path, destination)
    }
}

/// Where uploaded objects end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Google Cloud Storage, authenticated with a service-account file
    Gcs { credential_path: PathBuf },
    /// Local directory; each bucket is a sub-directory of `root`
    Fs { root: PathBuf },
}

impl StoreBackend {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Gcs { .. } => "gs",
            Self::Fs { .. } => "file",
        }
    }

    /// Build an operator rooted at `bucket`
    pub fn operator(&self, bucket: &str) -> opendal::Result<Operator> {
        let op = match self {
            Self::Gcs { credential_path } => {
                let builder = opendal::services::Gcs::default()
                    .bucket(bucket)
                    .credential_path(&credential_path.to_string_lossy());
                Operator::new(builder)?.finish()
            }
            Self::Fs { root } => {
                let builder =
                    opendal::services::Fs::default().root(&root.join(bucket).to_string_lossy());
                Operator::new(builder)?.finish()
            }
        };
        Ok(op)
    }
}

#[derive(Debug)]
enum UploadError {
    Io(io::Error),
    Store(opendal::Error),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl From<io::Error> for UploadError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<opendal::Error> for UploadError {
    fn from(e: opendal::Error) -> Self {
        Self::Store(e)
    }
}

/// [`Uploader`] backed by an OpenDAL operator per bucket
#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    backend: StoreBackend,
    chunk_size: usize,
}

impl ObjectStoreUploader {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            chunk_size: CHUNK_SIZE,
        }
    }

    async fn upload_async(
        &self,
        local_path: &Path,
        destination: &RemoteObjectRef,
    ) -> Result<u64, UploadError> {
        let op = self.backend.operator(&destination.bucket)?;
        let mut file = File::open(local_path)?;
        // Parts are sized by the writer, not by how much each read returns
        let mut writer = op
            .writer_with(&destination.path)
            .chunk(self.chunk_size)
            .await?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            total += n as u64;
        }

        writer.close().await?;
        Ok(total)
    }
}

impl Uploader for ObjectStoreUploader {
    fn upload(&self, local_path: &Path, destination: &RemoteObjectRef) -> bool {
        log::info!(
            "Uploading {} to {}://{destination}...",
            local_path.display(),
            self.backend.scheme()
        );
        match SHARED_RUNTIME
            .handle()
            .block_on(self.upload_async(local_path, destination))
        {
            Ok(bytes) => {
                log::info!("Successfully uploaded {} ({bytes} bytes)", destination.path);
                true
            }
            Err(e) => {
                log::error!("Failed to upload {}: {e}", destination.path);
                false
            }
        }
    }
}
