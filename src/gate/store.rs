//! Filesystem-backed page store.
//!
//! Layout under the content root:
//!
//! ```text
//! <site>/<page>.gate.json     gating rule (ConditionGroup JSON)
//! <site>/<page>.json          protected payload
//! <site>/<page>/<slug>.json   protected payload for a slug
//! ```

use crate::gate::condition::ConditionSpec;
use crate::gate::content::{PageRef, PayloadSource, ProtectedPayload};
use crate::gate::error::PayloadError;
use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FsPageStore {
    root: PathBuf,
}

impl FsPageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load and validate the gating rule for a page.
    pub async fn load_conditions(&self, page: &PageRef) -> Result<Arc<ConditionSpec>, PayloadError> {
        let path = self
            .site_dir(&page.site)?
            .join(format!("{}.gate.json", segment(&page.page)?));
        let raw = read(&path, page).await?;
        Ok(Arc::new(ConditionSpec::parse_json(&raw)?))
    }

    fn site_dir(&self, site: &str) -> Result<PathBuf, PayloadError> {
        Ok(self.root.join(segment(site)?))
    }

    fn payload_path(&self, page: &PageRef) -> Result<PathBuf, PayloadError> {
        let site_dir = self.site_dir(&page.site)?;
        let page_name = segment(&page.page)?;
        Ok(match page.slug.as_deref() {
            Some(slug) => site_dir
                .join(page_name)
                .join(format!("{}.json", segment(slug)?)),
            None => site_dir.join(format!("{}.json", page_name)),
        })
    }
}

#[async_trait]
impl PayloadSource for FsPageStore {
    async fn fetch_protected_payload(&self, page: &PageRef) -> Result<ProtectedPayload, PayloadError> {
        let path = self.payload_path(page)?;
        let raw = read(&path, page).await?;
        let body = serde_json::from_str(&raw).map_err(|e| PayloadError::Parse(e.to_string()))?;
        Ok(ProtectedPayload {
            page: page.clone(),
            body,
        })
    }
}

async fn read(path: &Path, page: &PageRef) -> Result<String, PayloadError> {
    debug!("reading {}", path.display());
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(PayloadError::NotFound(page.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// A single path component: no separators, no dot-only names.
fn segment(name: &str) -> Result<&str, PayloadError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(name)
    } else {
        Err(PayloadError::InvalidPath(name.to_string()))
    }
}
