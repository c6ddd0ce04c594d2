//! Retrieval gateway: identifier to bytes plus serving headers.

use std::io::ErrorKind;

use tokio::fs;
use tracing::debug;

use attache_core::layout::sibling_paths;
use attache_core::{Error, Resolved, Result, ServeKind};

use crate::engine::RequestScope;

impl RequestScope<'_> {
    /// Resolve an identifier to its original bytes.
    pub async fn resolve(&mut self, id: &str) -> Result<Resolved> {
        self.resolve_for(id, ServeKind::Origin).await
    }

    /// Resolve an identifier for a serving kind.
    ///
    /// `View` and `Thumbnail` use the sibling rendition when the media is
    /// resizable and the rendition exists, else the original.
    pub async fn resolve_for(&mut self, id: &str, kind: ServeKind) -> Result<Resolved> {
        let attachment = self
            .get_attachment(id)
            .await?
            .ok_or_else(|| Error::NotFoundFile(id.to_string()))?;

        let origin = self.engine().layout().absolute(attachment.path());
        let path = match kind {
            ServeKind::View | ServeKind::Thumbnail if attachment.is_resizable() => {
                let [view, thumbnail] = sibling_paths(&origin);
                let rendition = if kind == ServeKind::View { view } else { thumbnail };
                if fs::try_exists(&rendition).await.unwrap_or(false) {
                    rendition
                } else {
                    origin
                }
            }
            _ => origin,
        };

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(Error::NotFoundFile(id.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    subsystem = "gateway",
                    attachment_id = %id,
                    path = %path.display(),
                    "Record resolved but bytes are missing"
                );
                return Err(Error::NotFoundFile(id.to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Resolved {
            path,
            mime_type: attachment.mime_type().to_string(),
            display_name: attachment.display_name().to_string(),
            byte_size: metadata.len(),
            is_published: attachment.is_published(),
        })
    }
}

/// HTTP response headers for a resolved file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeHeaders {
    pub content_type: String,
    pub cache_control: String,
    pub content_disposition: Option<String>,
}

impl ServeHeaders {
    /// Inline kinds are cacheable for `cache_max_age_secs`; downloads carry
    /// an attachment disposition with the RFC 5987 encoded `requested_name`
    /// (the stored display name when empty) and are not cached.
    pub fn for_kind(
        kind: ServeKind,
        resolved: &Resolved,
        requested_name: &str,
        cache_max_age_secs: u64,
    ) -> Self {
        if kind.is_download() {
            let name = if requested_name.is_empty() {
                resolved.display_name.as_str()
            } else {
                requested_name
            };
            Self {
                content_type: resolved.mime_type.clone(),
                cache_control: "no-store".to_string(),
                content_disposition: Some(format!(
                    "attachment; filename*=UTF-8''{}",
                    urlencoding::encode(name)
                )),
            }
        } else {
            Self {
                content_type: resolved.mime_type.clone(),
                cache_control: format!("max-age={}", cache_max_age_secs),
                content_disposition: None,
            }
        }
    }
}
