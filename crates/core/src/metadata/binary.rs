//! Size and checksum for any file.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use super::{FileMetadata, Metadata, MetadataError, MetadataExtractor};

const BUFFER_SIZE: usize = 64 * 1024;

/// Accepts every MIME type; register it last.
#[derive(Debug, Default, Clone)]
pub struct BinaryMetadataReader;

impl BinaryMetadataReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataExtractor for BinaryMetadataReader {
    fn name(&self) -> &str {
        "binary"
    }

    fn supports(&self, _mime_type: &str) -> bool {
        true
    }

    async fn extract(&self, path: &Path, _mime_type: &str) -> Result<Metadata, MetadataError> {
        let file = File::open(path).await?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            bytes += bytes_read as u64;
        }

        Ok(Metadata::File(FileMetadata {
            bytes,
            sha256: format!("{:x}", hasher.finalize()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.vpx");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let meta = BinaryMetadataReader::new()
            .extract(&path, "application/x-visual-pinball-table-x")
            .await
            .unwrap();
        assert_eq!(
            meta,
            Metadata::File(FileMetadata {
                bytes: 11,
                sha256: "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
                    .to_string(),
            })
        );
    }
}
