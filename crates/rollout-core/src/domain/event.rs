//! Build-completion events as they arrive from a container registry.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, RolloutError};

/// A fully qualified image reference split into image and tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTag {
    pub image: String,
    pub version: String,
}

impl ImageTag {
    /// Split `registry[:port]/path/image:tag` on the tag separator.
    ///
    /// The separator is the last `:` after the last `/`, so registry ports
    /// are kept as part of the image.
    pub fn parse(reference: &str) -> Result<Self> {
        let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let sep = reference[name_start..]
            .rfind(':')
            .map(|i| name_start + i)
            .ok_or_else(|| {
                RolloutError::InvalidImageTag(format!("{reference}: missing version"))
            })?;
        let (image, version) = (&reference[..sep], &reference[sep + 1..]);
        if image.is_empty() || version.is_empty() {
            return Err(RolloutError::InvalidImageTag(reference.to_string()));
        }
        Ok(ImageTag {
            image: image.to_string(),
            version: version.to_string(),
        })
    }
}

impl std::fmt::Display for ImageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.image, self.version)
    }
}

/// Registry action that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegistryAction {
    Insert,
    Delete,
    #[serde(other)]
    Other,
}

/// Container-registry notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub action: RegistryAction,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl RegistryEvent {
    pub fn from_json(raw: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// The image to roll out, or `None` for events that do not trigger a
    /// rollout (deletions, untagged pushes).
    pub fn image_tag(&self) -> Result<Option<ImageTag>> {
        if self.action != RegistryAction::Insert {
            return Ok(None);
        }
        match &self.tag {
            Some(tag) => ImageTag::parse(tag).map(Some),
            None => Ok(None),
        }
    }
}
