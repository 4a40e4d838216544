//! Image and layer records.

use serde::Serialize;

use crate::error::{LayerError, Result};

/// Tag used when a reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// One filesystem layer of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    /// Content-addressed layer identifier. Never empty.
    pub blob_sum: String,
    /// Build step recorded by the engine, when both sources were available.
    pub history: Option<String>,
}

impl Layer {
    pub fn new(blob_sum: impl Into<String>) -> Self {
        Self {
            blob_sum: blob_sum.into(),
            history: None,
        }
    }

    pub fn with_history(blob_sum: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            blob_sum: blob_sum.into(),
            history: Some(history.into()),
        }
    }
}

/// A local container image and its layers, base layer first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub name: String,
    pub tag: String,
    pub fs_layers: Vec<Layer>,
}

impl Image {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            fs_layers: Vec::new(),
        }
    }

    /// Parse `repository[:tag]`.
    ///
    /// A colon only separates the tag when it comes after the last `/`, so
    /// `registry:5000/app` is a repository with the default tag.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.contains('@') {
            return Err(LayerError::InvalidReference(reference.to_string()));
        }

        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match reference[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&reference[..split], &reference[split + 1..])
            }
            None => (reference, DEFAULT_TAG),
        };

        if name.is_empty() || tag.is_empty() || name.ends_with('/') {
            return Err(LayerError::InvalidReference(reference.to_string()));
        }

        Ok(Self::new(name, tag))
    }

    /// The `name:tag` form handed to the container engine.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}
