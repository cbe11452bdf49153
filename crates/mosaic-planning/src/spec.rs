//! Specification input

use mosaic_core::{MosaicError, Result};
use serde::{Deserialize, Serialize};

/// Entity the author already knows about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHint {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl EntityHint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }
}

/// A software specification to plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub entities: Vec<EntityHint>,
}

impl Specification {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            entities: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity: EntityHint) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(MosaicError::planning(1, "specification text is empty"));
        }
        Ok(())
    }
}
