use crate::core::io::{CodecError, FileFormat, read_structure};
use crate::core::models::structure::StructureModel;
use crate::pipeline::error::RowError;
use crate::pipeline::layout::RunLayout;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// A located and classified structure file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureHandle {
    pub id: String,
    pub local_path: PathBuf,
    /// `Modern` only when the legacy encoding cannot represent the file
    /// (an atom serial beyond the fixed field width).
    pub format: FileFormat,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no structure published under id '{id}'")]
    NotFound { id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network retrieval of a structure by id.
#[async_trait]
pub trait StructureFetcher: Send + Sync {
    /// Fetches the structure and writes it into `dest_dir`, returning the
    /// written path.
    async fn fetch_by_id(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Fetcher backed by the public RCSB file service.
pub struct RcsbFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl RcsbFetcher {
    const DEFAULT_BASE_URL: &'static str = "https://files.rcsb.org/download";

    pub fn new() -> Self {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for RcsbFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StructureFetcher for RcsbFetcher {
    async fn fetch_by_id(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        // Published ids are uppercase; the local file keeps the manifest
        // casing so later probes find it.
        let remote_id = id.to_uppercase();

        for format in [FileFormat::Legacy, FileFormat::Modern] {
            let ext = format.extension();
            let url = format!("{}/{}.{}", self.base_url, remote_id, ext);
            debug!("Fetching {url}");

            let response = self.client.get(&url).send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                // Oversized structures are published in the modern
                // encoding only; fall through to it.
                continue;
            }
            let response = response.error_for_status()?;
            let bytes = response.bytes().await?;

            let dest = dest_dir.join(format!("{id}.{ext}"));
            fs::write(&dest, &bytes).await?;
            info!("Fetched '{id}' into {}", dest.display());
            return Ok(dest);
        }

        Err(FetchError::NotFound { id: id.to_string() })
    }
}

/// Locates a structure file for `id`, fetching it when absent locally.
///
/// Local probes try the legacy extension first, then the modern one. The
/// returned model is the parsed content; format classification is by
/// content, not by extension.
pub async fn resolve(
    layout: &RunLayout,
    id: &str,
    fetcher: &dyn StructureFetcher,
) -> Result<(StructureHandle, StructureModel), RowError> {
    let local_path = match probe_local(layout.root(), id) {
        Some(path) => {
            debug!("Resolved '{id}' locally: {}", path.display());
            path
        }
        None => fetcher
            .fetch_by_id(id, layout.root())
            .await
            .map_err(|e| RowError::Resolution {
                id: id.to_string(),
                reason: e.to_string(),
            })?,
    };

    let model = read_structure(&local_path).map_err(|source: CodecError| RowError::Load {
        id: id.to_string(),
        path: local_path.clone(),
        source,
    })?;

    let format = FileFormat::classify(&model);
    debug!("Classified '{id}' as {format}");

    Ok((
        StructureHandle {
            id: id.to_string(),
            local_path,
            format,
        },
        model,
    ))
}

fn probe_local(root: &Path, id: &str) -> Option<PathBuf> {
    for format in [FileFormat::Legacy, FileFormat::Modern] {
        let candidate = root.join(format!("{id}.{}", format.extension()));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
