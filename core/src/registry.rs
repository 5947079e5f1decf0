//! Static catalog of the documents an application has to supply.
//!
//! The registry is built once when a workflow is created. Its order is the
//! step order of the intake flow and never changes afterwards.

use std::collections::HashSet;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;
use strum_macros::IntoStaticStr;

use crate::error::ConstraintViolation;
use crate::error::IntakeError;
use crate::error::Result;

const MIB: u64 = 1024 * 1024;

const MEDIA_JPEG: &str = "image/jpeg";
const MEDIA_PNG: &str = "image/png";
const MEDIA_PDF: &str = "application/pdf";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CategoryId {
    Identity,
    Address,
    Photo,
    Signature,
}

impl CategoryId {
    /// Resolves user-supplied text such as `"Photo"` or `" address "`.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        CategoryId::from_str(&normalized).map_err(|_| IntakeError::category_unknown(raw.trim()))
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// What the presentation layer knows about a dropped file. The bytes stay
/// opaque; only this descriptor is checked against category constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadDescriptor {
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
}

impl PayloadDescriptor {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            size_bytes,
        }
    }

    /// `image/JPEG; name=scan` and `image/jpeg` compare equal.
    fn essence(&self) -> String {
        self.media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCategory {
    id: CategoryId,
    title: String,
    accepted_media_types: Vec<String>,
    max_size_bytes: u64,
}

impl DocumentCategory {
    pub fn new<S: Into<String>>(
        id: CategoryId,
        title: impl Into<String>,
        accepted_media_types: impl IntoIterator<Item = S>,
        max_size_bytes: u64,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            accepted_media_types: accepted_media_types
                .into_iter()
                .map(|media| media.into().to_ascii_lowercase())
                .collect(),
            max_size_bytes,
        }
    }

    pub fn id(&self) -> CategoryId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn accepted_media_types(&self) -> &[String] {
        &self.accepted_media_types
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn accepts_media_type(&self, media_type: &str) -> bool {
        let probe = PayloadDescriptor::new("", media_type, 0).essence();
        self.accepted_media_types.iter().any(|media| *media == probe)
    }

    /// Dropzone-style admission check performed before a file is recorded.
    pub fn admits(&self, descriptor: &PayloadDescriptor) -> std::result::Result<(), ConstraintViolation> {
        if !self.accepts_media_type(&descriptor.media_type) {
            return Err(ConstraintViolation::UnsupportedMediaType {
                media_type: descriptor.media_type.clone(),
                accepted: self.accepted_media_types.clone(),
            });
        }
        if descriptor.size_bytes > self.max_size_bytes {
            return Err(ConstraintViolation::TooLarge {
                size_bytes: descriptor.size_bytes,
                max_size_bytes: self.max_size_bytes,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRegistry {
    categories: Vec<DocumentCategory>,
    first: CategoryId,
    last: CategoryId,
}

impl DocumentRegistry {
    /// Builds a custom catalog. Order is preserved as the step order.
    pub fn new(categories: Vec<DocumentCategory>) -> Result<Self> {
        let (Some(first), Some(last)) = (categories.first(), categories.last()) else {
            return Err(IntakeError::RegistryInvalid {
                reason: "at least one category is required".to_string(),
            });
        };
        let (first, last) = (first.id(), last.id());
        let mut seen = HashSet::new();
        for category in &categories {
            if !seen.insert(category.id()) {
                return Err(IntakeError::RegistryInvalid {
                    reason: format!("category {} listed twice", category.id()),
                });
            }
            if category.max_size_bytes() == 0 {
                return Err(IntakeError::RegistryInvalid {
                    reason: format!("category {} has a zero size limit", category.id()),
                });
            }
        }
        Ok(Self {
            categories,
            first,
            last,
        })
    }

    /// The four documents every application needs.
    pub fn standard() -> Self {
        Self {
            first: CategoryId::Identity,
            last: CategoryId::Signature,
            categories: vec![
                DocumentCategory::new(
                    CategoryId::Identity,
                    "Identity Proof (Aadhaar, Voter ID)",
                    [MEDIA_JPEG, MEDIA_PNG, MEDIA_PDF],
                    5 * MIB,
                ),
                DocumentCategory::new(
                    CategoryId::Address,
                    "Address Proof (Utility Bill, Bank Statement)",
                    [MEDIA_JPEG, MEDIA_PNG, MEDIA_PDF],
                    5 * MIB,
                ),
                DocumentCategory::new(
                    CategoryId::Photo,
                    "Passport-size Photo",
                    [MEDIA_JPEG, MEDIA_PNG],
                    2 * MIB,
                ),
                DocumentCategory::new(
                    CategoryId::Signature,
                    "Signature",
                    [MEDIA_JPEG, MEDIA_PNG],
                    MIB,
                ),
            ],
        }
    }

    pub fn categories_in_order(&self) -> &[DocumentCategory] {
        &self.categories
    }

    pub fn ids(&self) -> impl Iterator<Item = CategoryId> + '_ {
        self.categories.iter().map(DocumentCategory::id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: CategoryId) -> Result<&DocumentCategory> {
        self.categories
            .iter()
            .find(|category| category.id() == id)
            .ok_or_else(|| IntakeError::category_unknown(id))
    }

    pub fn position(&self, id: CategoryId) -> Option<usize> {
        self.categories.iter().position(|category| category.id() == id)
    }

    pub fn first(&self) -> CategoryId {
        self.first
    }

    pub fn last(&self) -> CategoryId {
        self.last
    }

    pub fn is_last(&self, id: CategoryId) -> bool {
        self.last() == id
    }

    pub fn next_after(&self, id: CategoryId) -> Option<CategoryId> {
        let idx = self.position(id)?;
        self.categories.get(idx + 1).map(DocumentCategory::id)
    }

    pub fn previous_before(&self, id: CategoryId) -> Option<CategoryId> {
        let idx = self.position(id)?;
        idx.checked_sub(1)
            .and_then(|prev| self.categories.get(prev))
            .map(DocumentCategory::id)
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn standard_order_is_fixed() {
        let registry = DocumentRegistry::standard();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(
            ids,
            vec![
                CategoryId::Identity,
                CategoryId::Address,
                CategoryId::Photo,
                CategoryId::Signature,
            ]
        );
        assert_eq!(registry.first(), CategoryId::Identity);
        assert_eq!(registry.last(), CategoryId::Signature);
        assert_eq!(registry.next_after(CategoryId::Photo), Some(CategoryId::Signature));
        assert_eq!(registry.next_after(CategoryId::Signature), None);
        assert_eq!(registry.previous_before(CategoryId::Identity), None);
        assert_eq!(registry.previous_before(CategoryId::Address), Some(CategoryId::Identity));
    }

    #[test]
    fn parses_category_text() {
        assert_eq!(CategoryId::parse(" Photo ").unwrap(), CategoryId::Photo);
        assert_eq!(CategoryId::Signature.to_string(), "signature");
        let names: Vec<&str> = [CategoryId::Identity, CategoryId::Address, CategoryId::Photo]
            .into_iter()
            .map(CategoryId::as_str)
            .collect();
        assert_eq!(names, vec!["identity", "address", "photo"]);
        let err = CategoryId::parse("passport").unwrap_err();
        assert!(matches!(err, IntakeError::CategoryUnknown { category } if category == "passport"));
    }

    #[test]
    fn admits_enforces_media_type_and_size() {
        let registry = DocumentRegistry::standard();
        let photo = registry.get(CategoryId::Photo).unwrap();

        assert_eq!(photo.admits(&PayloadDescriptor::new("me.png", "image/PNG", 1024)), Ok(()));
        assert!(matches!(
            photo.admits(&PayloadDescriptor::new("me.pdf", "application/pdf", 1024)),
            Err(ConstraintViolation::UnsupportedMediaType { .. })
        ));
        assert_eq!(
            photo.admits(&PayloadDescriptor::new("me.jpg", "image/jpeg", 3 * MIB)),
            Err(ConstraintViolation::TooLarge {
                size_bytes: 3 * MIB,
                max_size_bytes: 2 * MIB,
            })
        );

        let identity = registry.get(CategoryId::Identity).unwrap();
        assert!(identity.accepts_media_type("application/pdf; version=1.7"));
    }

    #[test]
    fn custom_registry_rejects_duplicates_and_reports_missing() {
        let photo = DocumentCategory::new(CategoryId::Photo, "Photo", ["image/png"], MIB);
        let err = DocumentRegistry::new(vec![photo.clone(), photo.clone()]).unwrap_err();
        assert!(matches!(err, IntakeError::RegistryInvalid { .. }));
        assert!(DocumentRegistry::new(Vec::new()).is_err());

        let registry = DocumentRegistry::new(vec![photo]).unwrap();
        assert_eq!(registry.first(), registry.last());
        assert!(!registry.contains(CategoryId::Identity));
        assert!(matches!(
            registry.get(CategoryId::Identity),
            Err(IntakeError::CategoryUnknown { .. })
        ));
    }

    #[test]
    fn custom_registry_bounds_follow_given_order() {
        let registry = DocumentRegistry::new(vec![
            DocumentCategory::new(CategoryId::Signature, "Signature", ["image/png"], MIB),
            DocumentCategory::new(CategoryId::Photo, "Photo", ["image/png"], MIB),
        ])
        .unwrap();
        assert_eq!(registry.first(), CategoryId::Signature);
        assert_eq!(registry.last(), CategoryId::Photo);
        assert!(registry.is_last(CategoryId::Photo));
        assert_eq!(registry.previous_before(CategoryId::Signature), None);
    }
}
