//! On-disk mirror of the full-index tree

use super::IndexTransport;
use crate::error::TransportError;
use crate::locator::ResourceLocator;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads `{root}/{year}/QTR{q}/{file}`
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, locator: &ResourceLocator) -> PathBuf {
        self.root
            .join(locator.period.year().to_string())
            .join(format!("QTR{}", locator.period.quarter()))
            .join(locator.file_name())
    }
}

#[async_trait]
impl IndexTransport for LocalTransport {
    async fn fetch(&self, locator: &ResourceLocator) -> Result<Vec<u8>, TransportError> {
        let path = self.path_for(locator);
        debug!(path = %path.display(), "Reading local index resource");

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::NotFound(path.display().to_string()),
            _ => TransportError::Failed(format!("{}: {}", path.display(), e)),
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
