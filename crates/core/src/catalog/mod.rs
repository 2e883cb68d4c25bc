//! Static declaration of which variations each artifact produces.
//!
//! The catalog maps an (artifact type, MIME category) pair to a list of
//! [`VariationDefinition`]s. The `source` relation inside one entry forms a
//! forest rooted at the original upload; it is validated once at construction
//! so lookups never have to deal with cycles or dangling references.

mod builtin;
mod error;
mod types;

pub use error::CatalogError;
pub use types::*;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};

use crate::storage::ORIGINAL_DIR;

static VARIATION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("variation name pattern"));

/// Validated variation declarations, keyed by (artifact type, MIME category).
#[derive(Debug, Clone)]
pub struct VariationCatalog {
    entries: HashMap<(ArtifactType, MimeCategory), Vec<VariationDefinition>>,
}

impl VariationCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// The production variation set.
    pub fn builtin() -> Result<Self, CatalogError> {
        builtin::declare(Self::builder()).build()
    }

    /// All variations for an artifact of `artifact_type` whose original has `mime_type`.
    ///
    /// Undeclared pairs are an error, never an empty list. Types that need no
    /// variations are declared with an explicit empty entry.
    pub fn variations_for(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
    ) -> Result<&[VariationDefinition], CatalogError> {
        let category = MimeCategory::from_mime(mime_type);
        self.entries
            .get(&(artifact_type, category))
            .map(Vec::as_slice)
            .ok_or(CatalogError::UnknownArtifactType {
                artifact_type,
                category,
            })
    }

    pub fn variation(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
        name: &str,
    ) -> Result<Option<&VariationDefinition>, CatalogError> {
        Ok(self
            .variations_for(artifact_type, mime_type)?
            .iter()
            .find(|v| v.name == name))
    }

    /// Like [`variation`](Self::variation) but an undeclared name is an error.
    pub fn require_variation(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
        name: &str,
    ) -> Result<&VariationDefinition, CatalogError> {
        self.variation(artifact_type, mime_type, name)?
            .ok_or_else(|| CatalogError::UnknownVariation {
                artifact_type,
                category: MimeCategory::from_mime(mime_type),
                variation: name.to_string(),
            })
    }

    /// Variations derived directly from the original.
    pub fn roots(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
    ) -> Result<Vec<&VariationDefinition>, CatalogError> {
        Ok(self
            .variations_for(artifact_type, mime_type)?
            .iter()
            .filter(|v| v.is_root())
            .collect())
    }

    /// Variations whose `source` is `name`.
    pub fn direct_dependents(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
        name: &str,
    ) -> Result<Vec<&VariationDefinition>, CatalogError> {
        Ok(self
            .variations_for(artifact_type, mime_type)?
            .iter()
            .filter(|v| v.source.as_deref() == Some(name))
            .collect())
    }

    /// Every variation transitively derived from `name`, depth-first.
    pub fn all_dependents(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
        name: &str,
    ) -> Result<Vec<&VariationDefinition>, CatalogError> {
        let variations = self.variations_for(artifact_type, mime_type)?;
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        collect_dependents(variations, name, &mut visited, &mut out);
        Ok(out)
    }

    /// `name` followed by each of its ancestors, ending at a root variation.
    pub fn lineage(
        &self,
        artifact_type: ArtifactType,
        mime_type: &str,
        name: &str,
    ) -> Result<Vec<&VariationDefinition>, CatalogError> {
        let mut chain = Vec::new();
        let mut current = Some(self.require_variation(artifact_type, mime_type, name)?);
        while let Some(variation) = current {
            chain.push(variation);
            current = match &variation.source {
                Some(source) => Some(self.require_variation(artifact_type, mime_type, source)?),
                None => None,
            };
        }
        Ok(chain)
    }

    /// Iterate over every declared entry.
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = (ArtifactType, MimeCategory, &[VariationDefinition])> {
        self.entries
            .iter()
            .map(|((t, c), v)| (*t, *c, v.as_slice()))
    }
}

fn collect_dependents<'a>(
    variations: &'a [VariationDefinition],
    name: &str,
    visited: &mut HashSet<&'a str>,
    out: &mut Vec<&'a VariationDefinition>,
) {
    for dependent in variations
        .iter()
        .filter(|v| v.source.as_deref() == Some(name))
    {
        if !visited.insert(dependent.name.as_str()) {
            continue;
        }
        out.push(dependent);
        collect_dependents(variations, &dependent.name, visited, out);
    }
}

/// Collects catalog entries and validates them on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: Vec<(ArtifactType, MimeCategory, Vec<VariationDefinition>)>,
}

impl CatalogBuilder {
    pub fn entry(
        mut self,
        artifact_type: ArtifactType,
        category: MimeCategory,
        variations: Vec<VariationDefinition>,
    ) -> Self {
        self.entries.push((artifact_type, category, variations));
        self
    }

    /// Declare that this pair is known but produces no variations.
    pub fn empty(self, artifact_type: ArtifactType, category: MimeCategory) -> Self {
        self.entry(artifact_type, category, Vec::new())
    }

    pub fn build(self) -> Result<VariationCatalog, CatalogError> {
        let mut entries = HashMap::new();
        for (artifact_type, category, variations) in self.entries {
            validate_entry(artifact_type, category, &variations)?;
            if entries
                .insert((artifact_type, category), variations)
                .is_some()
            {
                return Err(CatalogError::DuplicateEntry {
                    artifact_type,
                    category,
                });
            }
        }
        Ok(VariationCatalog { entries })
    }
}

fn validate_entry(
    artifact_type: ArtifactType,
    category: MimeCategory,
    variations: &[VariationDefinition],
) -> Result<(), CatalogError> {
    let by_name: HashMap<&str, &VariationDefinition> =
        variations.iter().map(|v| (v.name.as_str(), v)).collect();

    let mut seen = HashSet::new();
    for variation in variations {
        if !VARIATION_NAME.is_match(&variation.name) {
            return Err(CatalogError::InvalidName {
                name: variation.name.clone(),
            });
        }
        if variation.name == ORIGINAL_DIR {
            return Err(CatalogError::ReservedName {
                name: variation.name.clone(),
            });
        }
        if !seen.insert(variation.name.as_str()) {
            return Err(CatalogError::DuplicateVariation {
                artifact_type,
                category,
                variation: variation.name.clone(),
            });
        }
        if let Derivation::Rotate { degrees, .. } = variation.derivation {
            if degrees % 90 != 0 {
                return Err(CatalogError::InvalidDerivation {
                    variation: variation.name.clone(),
                    reason: format!("rotation of {} degrees is not a multiple of 90", degrees),
                });
            }
        }
        if let Some(source) = &variation.source {
            if source == ORIGINAL_DIR {
                return Err(CatalogError::ReservedName {
                    name: source.clone(),
                });
            }
            if source == &variation.name {
                return Err(CatalogError::SelfSource {
                    artifact_type,
                    category,
                    variation: variation.name.clone(),
                });
            }
            if !by_name.contains_key(source.as_str()) {
                return Err(CatalogError::UnknownSource {
                    artifact_type,
                    category,
                    variation: variation.name.clone(),
                    source_name: source.clone(),
                });
            }
        }
    }

    // Every source exists, so walking up either reaches a root or revisits a node.
    for variation in variations {
        let mut path = vec![variation.name.clone()];
        let mut current = variation;
        while let Some(source) = &current.source {
            if path.iter().any(|p| p == source) {
                path.push(source.clone());
                return Err(CatalogError::Cycle {
                    artifact_type,
                    category,
                    path,
                });
            }
            path.push(source.clone());
            match by_name.get(source.as_str()) {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resize(name: &str, priority: i32) -> VariationDefinition {
        VariationDefinition::new(
            name,
            "image/jpeg",
            priority,
            Derivation::Resize {
                width: 100,
                height: 100,
                fit: Fit::Contain,
            },
        )
    }

    fn sample_catalog() -> VariationCatalog {
        VariationCatalog::builder()
            .entry(
                ArtifactType::PlayfieldFs,
                MimeCategory::Image,
                vec![
                    resize("medium", 10),
                    resize("medium-2x", 20),
                    resize("square", 30).with_source("medium"),
                    resize("square-small", 40).with_source("square"),
                    resize("square-2x", 35).with_source("medium-2x"),
                ],
            )
            .empty(ArtifactType::Rom, MimeCategory::Archive)
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_pair_is_an_error() {
        let catalog = sample_catalog();
        let err = catalog
            .variations_for(ArtifactType::Backglass, "image/png")
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownArtifactType { .. }));
    }

    #[test]
    fn test_explicit_empty_entry() {
        let catalog = sample_catalog();
        let variations = catalog
            .variations_for(ArtifactType::Rom, "application/zip")
            .unwrap();
        assert!(variations.is_empty());
    }

    #[test]
    fn test_roots_and_dependents() {
        let catalog = sample_catalog();
        let t = ArtifactType::PlayfieldFs;

        let roots: Vec<_> = catalog
            .roots(t, "image/png")
            .unwrap()
            .into_iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(roots, vec!["medium", "medium-2x"]);

        let direct: Vec<_> = catalog
            .direct_dependents(t, "image/png", "medium")
            .unwrap()
            .into_iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(direct, vec!["square"]);

        let all: Vec<_> = catalog
            .all_dependents(t, "image/png", "medium")
            .unwrap()
            .into_iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(all, vec!["square", "square-small"]);

        assert!(catalog
            .all_dependents(t, "image/png", "square-small")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_lineage_walks_to_root() {
        let catalog = sample_catalog();
        let names: Vec<_> = catalog
            .lineage(ArtifactType::PlayfieldFs, "image/jpeg", "square-small")
            .unwrap()
            .into_iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, vec!["square-small", "square", "medium"]);
    }

    #[test]
    fn test_require_unknown_variation() {
        let catalog = sample_catalog();
        let err = catalog
            .require_variation(ArtifactType::PlayfieldFs, "image/jpeg", "huge")
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownVariation { .. }));
    }

    #[test]
    fn test_original_is_reserved() {
        let result = VariationCatalog::builder()
            .entry(
                ArtifactType::Logo,
                MimeCategory::Image,
                vec![resize("original", 10)],
            )
            .build();
        assert!(matches!(result, Err(CatalogError::ReservedName { .. })));

        let result = VariationCatalog::builder()
            .entry(
                ArtifactType::Logo,
                MimeCategory::Image,
                vec![resize("small", 10).with_source("original")],
            )
            .build();
        assert!(matches!(result, Err(CatalogError::ReservedName { .. })));
    }

    #[test]
    fn test_partial_rotation_rejected() {
        let rotate = |degrees| {
            VariationDefinition::new(
                "rotated",
                "image/jpeg",
                10,
                Derivation::Rotate {
                    degrees,
                    width: 100,
                    height: 100,
                },
            )
        };
        let result = VariationCatalog::builder()
            .entry(ArtifactType::Logo, MimeCategory::Image, vec![rotate(45)])
            .build();
        assert!(matches!(result, Err(CatalogError::InvalidDerivation { .. })));

        assert!(VariationCatalog::builder()
            .entry(ArtifactType::Logo, MimeCategory::Image, vec![rotate(270)])
            .build()
            .is_ok());
    }

    #[test]
    fn test_self_source_rejected() {
        let result = VariationCatalog::builder()
            .entry(
                ArtifactType::Logo,
                MimeCategory::Image,
                vec![resize("medium", 10).with_source("medium")],
            )
            .build();
        assert!(matches!(result, Err(CatalogError::SelfSource { .. })));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let result = VariationCatalog::builder()
            .entry(
                ArtifactType::Logo,
                MimeCategory::Image,
                vec![resize("small", 10).with_source("medium")],
            )
            .build();
        assert!(matches!(result, Err(CatalogError::UnknownSource { .. })));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = VariationCatalog::builder()
            .entry(
                ArtifactType::Logo,
                MimeCategory::Image,
                vec![
                    resize("a", 10).with_source("c"),
                    resize("b", 10).with_source("a"),
                    resize("c", 10).with_source("b"),
                ],
            )
            .build();
        match result {
            Err(CatalogError::Cycle { path, .. }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_names_rejected() {
        for name in ["Medium", "-medium", "medium_2x", ""] {
            let result = VariationCatalog::builder()
                .entry(ArtifactType::Logo, MimeCategory::Image, vec![resize(name, 1)])
                .build();
            assert!(
                matches!(result, Err(CatalogError::InvalidName { .. })),
                "name {:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_duplicates_rejected() {
        let result = VariationCatalog::builder()
            .entry(
                ArtifactType::Logo,
                MimeCategory::Image,
                vec![resize("medium", 1), resize("medium", 2)],
            )
            .build();
        assert!(matches!(
            result,
            Err(CatalogError::DuplicateVariation { .. })
        ));

        let result = VariationCatalog::builder()
            .empty(ArtifactType::Rom, MimeCategory::Archive)
            .empty(ArtifactType::Rom, MimeCategory::Archive)
            .build();
        assert!(matches!(result, Err(CatalogError::DuplicateEntry { .. })));
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = VariationCatalog::builtin().unwrap();
        assert!(catalog.entries().count() > 0);

        let square = catalog
            .require_variation(ArtifactType::PlayfieldFs, "image/png", "square")
            .unwrap();
        assert_eq!(square.source.as_deref(), Some("medium"));

        let rom = catalog
            .variations_for(ArtifactType::Rom, "application/zip")
            .unwrap();
        assert!(rom.is_empty());
    }
}
