//! Record types for the content, draft, and attachment stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// MEDIA TYPE
// =============================================================================

/// Coarse file category derived from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Text,
    Icon,
    Svg,
    #[default]
    File,
}

impl MediaType {
    /// Media types for which an external worker writes `.view` and
    /// `.thumbnail` renditions next to the original.
    pub fn is_resizable(self) -> bool {
        matches!(self, Self::Image | Self::Icon | Self::Svg)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Document => write!(f, "document"),
            Self::Archive => write!(f, "archive"),
            Self::Text => write!(f, "text"),
            Self::Icon => write!(f, "icon"),
            Self::Svg => write!(f, "svg"),
            Self::File => write!(f, "file"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "archive" => Ok(Self::Archive),
            "text" => Ok(Self::Text),
            "icon" => Ok(Self::Icon),
            "svg" => Ok(Self::Svg),
            "file" => Ok(Self::File),
            _ => Err(format!("Invalid media type: {}", s)),
        }
    }
}

// =============================================================================
// OWNERSHIP
// =============================================================================

/// Owning component identified by a type + name pair (e.g. `module`/`board`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    pub component_type: String,
    pub component_name: String,
}

impl Component {
    pub fn new(component_type: impl Into<String>, component_name: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_name: component_name.into(),
        }
    }
}

/// Where attachments are mounted: a component plus a position within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    #[serde(flatten)]
    pub component: Component,
    pub position_type: String,
    pub position_id: String,
}

impl Slot {
    pub fn new(
        component: Component,
        position_type: impl Into<String>,
        position_id: impl ToString,
    ) -> Self {
        Self {
            component,
            position_type: position_type.into(),
            position_id: position_id.to_string(),
        }
    }
}

// =============================================================================
// STORE RECORDS
// =============================================================================

/// Content store row: one per distinct content hash.
///
/// `storage_path` is relative to the storage root and never changes after
/// the record is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub hash: String,
    pub storage_path: String,
    pub media_type: MediaType,
    pub mime_type: String,
    pub extension: String,
    pub byte_size: i64,
    pub width: i32,
    pub height: i32,
    pub created_at: DateTime<Utc>,
}

/// Draft store row: an uploaded file not yet bound to an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub draft_id: String,
    pub storage_path: String,
    /// Client-supplied file name, kept as the attachment's display name.
    pub name: String,
    /// Content hash computed at intake, if the intake computed one.
    pub hash: Option<String>,
    pub media_type: MediaType,
    pub mime_type: String,
    pub extension: String,
    pub byte_size: i64,
    pub width: i32,
    pub height: i32,
    /// Owner hint recorded at upload time.
    pub owner: Option<Component>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Attachment store row: a published binding of content to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub attachment_id: String,
    pub hash: String,
    #[serde(flatten)]
    pub slot: Slot,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// LOGICAL VIEW
// =============================================================================

/// An attachment as seen by callers: either still a draft, or published
/// and joined with the file record backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Attachment {
    Draft(DraftRecord),
    Published {
        record: AttachmentRecord,
        file: FileRecord,
    },
}

impl Attachment {
    pub fn id(&self) -> &str {
        match self {
            Self::Draft(draft) => &draft.draft_id,
            Self::Published { record, .. } => &record.attachment_id,
        }
    }

    /// Storage path relative to the storage root.
    pub fn path(&self) -> &str {
        match self {
            Self::Draft(draft) => &draft.storage_path,
            Self::Published { file, .. } => &file.storage_path,
        }
    }

    /// Content hash; a draft only has one if intake computed it.
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Draft(draft) => draft.hash.as_deref(),
            Self::Published { file, .. } => Some(&file.hash),
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Draft(draft) => &draft.mime_type,
            Self::Published { file, .. } => &file.mime_type,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Draft(draft) => draft.media_type,
            Self::Published { file, .. } => file.media_type,
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Draft(draft) => &draft.extension,
            Self::Published { file, .. } => &file.extension,
        }
    }

    pub fn byte_size(&self) -> i64 {
        match self {
            Self::Draft(draft) => draft.byte_size,
            Self::Published { file, .. } => file.byte_size,
        }
    }

    pub fn width(&self) -> i32 {
        match self {
            Self::Draft(draft) => draft.width,
            Self::Published { file, .. } => file.width,
        }
    }

    pub fn height(&self) -> i32 {
        match self {
            Self::Draft(draft) => draft.height,
            Self::Published { file, .. } => file.height,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Draft(draft) => &draft.name,
            Self::Published { record, .. } => &record.display_name,
        }
    }

    /// The slot a published attachment occupies.
    pub fn slot(&self) -> Option<&Slot> {
        match self {
            Self::Draft(_) => None,
            Self::Published { record, .. } => Some(&record.slot),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    pub fn is_resizable(&self) -> bool {
        self.media_type().is_resizable()
    }
}

// =============================================================================
// SERVING
// =============================================================================

/// Rendition requested by the serving layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeKind {
    Origin,
    View,
    Thumbnail,
    Download,
}

impl ServeKind {
    /// Downloads force attachment disposition and disable caching.
    pub fn is_download(self) -> bool {
        matches!(self, Self::Download)
    }
}

impl std::fmt::Display for ServeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Origin => write!(f, "origin"),
            Self::View => write!(f, "view"),
            Self::Thumbnail => write!(f, "thumbnail"),
            Self::Download => write!(f, "download"),
        }
    }
}

impl std::str::FromStr for ServeKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "origin" => Ok(Self::Origin),
            "view" => Ok(Self::View),
            "thumbnail" => Ok(Self::Thumbnail),
            "download" => Ok(Self::Download),
            _ => Err(format!("Invalid serve kind: {}", s)),
        }
    }
}

/// Result of resolving an identifier for serving.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Absolute path of the bytes to serve.
    pub path: PathBuf,
    pub mime_type: String,
    pub display_name: String,
    pub byte_size: u64,
    pub is_published: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> DraftRecord {
        DraftRecord {
            draft_id: "d1".to_string(),
            storage_path: "drafts/d1".to_string(),
            name: "photo.jpg".to_string(),
            hash: None,
            media_type: MediaType::Image,
            mime_type: "image/jpeg".to_string(),
            extension: "jpg".to_string(),
            byte_size: 3,
            width: 4,
            height: 2,
            owner: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn test_media_type_round_trip_names() {
        for name in [
            "image", "video", "audio", "document", "archive", "text", "icon", "svg", "file",
        ] {
            let parsed: MediaType = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
        assert!("blob".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_resizable_media_types() {
        assert!(MediaType::Image.is_resizable());
        assert!(MediaType::Icon.is_resizable());
        assert!(MediaType::Svg.is_resizable());
        assert!(!MediaType::Video.is_resizable());
        assert!(!MediaType::Document.is_resizable());
        assert!(!MediaType::File.is_resizable());
    }

    #[test]
    fn test_draft_view_reports_unpublished() {
        let attachment = Attachment::Draft(draft());
        assert!(!attachment.is_published());
        assert_eq!(attachment.id(), "d1");
        assert_eq!(attachment.path(), "drafts/d1");
        assert_eq!(attachment.hash(), None);
        assert_eq!(attachment.display_name(), "photo.jpg");
        assert!(attachment.slot().is_none());
        assert!(attachment.is_resizable());
    }

    #[test]
    fn test_published_view_delegates_to_file() {
        let file = FileRecord {
            hash: "ab12".to_string(),
            storage_path: "files/a/b/ab12.wxyz".to_string(),
            media_type: MediaType::Document,
            mime_type: "application/pdf".to_string(),
            extension: "pdf".to_string(),
            byte_size: 1024,
            width: 0,
            height: 0,
            created_at: Utc::now(),
        };
        let record = AttachmentRecord {
            attachment_id: "a1".to_string(),
            hash: "ab12".to_string(),
            slot: Slot::new(Component::new("module", "board"), "post", 7),
            display_name: "report.pdf".to_string(),
            created_at: Utc::now(),
        };
        let attachment = Attachment::Published { record, file };

        assert!(attachment.is_published());
        assert_eq!(attachment.path(), "files/a/b/ab12.wxyz");
        assert_eq!(attachment.hash(), Some("ab12"));
        assert_eq!(attachment.mime_type(), "application/pdf");
        assert_eq!(attachment.byte_size(), 1024);
        assert!(!attachment.is_resizable());
        assert_eq!(attachment.slot().unwrap().position_id, "7");
    }

    #[test]
    fn test_serve_kind_parse() {
        assert_eq!("view".parse::<ServeKind>().unwrap(), ServeKind::View);
        assert!("download".parse::<ServeKind>().unwrap().is_download());
        assert!(!ServeKind::Origin.is_download());
        assert!("resize".parse::<ServeKind>().is_err());
    }
}
