//! Per-profile element index
//!
//! Builds `byPath` / `choiceTypes` / `childrenOf` / `slicingAt` lookups over an
//! already-snapshotted `StructureDefinition`, so the validator's phases don't
//! each re-scan the flat `snapshot.element` array linearly.

use std::collections::HashMap;

use meridian_models::ElementDefinition;

/// A `value[x]`-style choice element, with its base name (`value`) split out
/// from the type suffix used on the instance (`valueString`, `valueQuantity`, ...).
#[derive(Debug, Clone, Copy)]
pub struct ChoiceBase<'a> {
    pub base_name: &'a str,
    pub element: &'a ElementDefinition,
}

/// Indexes over a single `StructureDefinition.snapshot.element` array.
///
/// Built once per profile and reused across every resource instance validated
/// against that profile.
pub struct ElementIndex<'a> {
    by_path: HashMap<&'a str, &'a ElementDefinition>,
    children_by_parent: HashMap<&'a str, Vec<&'a ElementDefinition>>,
    choice_bases_by_parent: HashMap<&'a str, Vec<ChoiceBase<'a>>>,
    slices_by_parent: HashMap<&'a str, Vec<&'a ElementDefinition>>,
    root_path: String,
}

impl<'a> ElementIndex<'a> {
    pub fn new(elements: &'a [ElementDefinition]) -> Self {
        let mut by_path = HashMap::new();
        let mut children_by_parent: HashMap<&'a str, Vec<&'a ElementDefinition>> = HashMap::new();
        let mut choice_bases_by_parent: HashMap<&'a str, Vec<ChoiceBase<'a>>> = HashMap::new();
        let mut slices_by_parent: HashMap<&'a str, Vec<&'a ElementDefinition>> = HashMap::new();

        for element in elements {
            if element.slice_name.is_some() {
                slices_by_parent
                    .entry(element.path.as_str())
                    .or_default()
                    .push(element);
                continue;
            }

            by_path.insert(element.path.as_str(), element);

            let Some((parent, name)) = element.path.rsplit_once('.') else {
                continue;
            };
            children_by_parent.entry(parent).or_default().push(element);

            if name.ends_with("[x]") {
                choice_bases_by_parent
                    .entry(parent)
                    .or_default()
                    .push(ChoiceBase {
                        base_name: name.trim_end_matches("[x]"),
                        element,
                    });
            }
        }

        let root_path = elements
            .first()
            .map(|e| e.path.clone())
            .unwrap_or_default();

        Self {
            by_path,
            children_by_parent,
            choice_bases_by_parent,
            slices_by_parent,
            root_path,
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn element_at(&self, path: &str) -> Option<&'a ElementDefinition> {
        self.by_path.get(path).copied()
    }

    pub fn children_of(&self, parent_path: &str) -> &[&'a ElementDefinition] {
        self.children_by_parent
            .get(parent_path)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn choice_bases_of(&self, parent_path: &str) -> &[ChoiceBase<'a>] {
        self.choice_bases_by_parent
            .get(parent_path)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Slice instances (elements carrying a `sliceName`) declared under `parent_path`.
    pub fn slicing_at(&self, parent_path: &str) -> &[&'a ElementDefinition] {
        self.slices_by_parent
            .get(parent_path)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_choice_variant_name(&self, parent_path: &str, name: &str) -> bool {
        self.choice_bases_of(parent_path).iter().any(|b| {
            name.starts_with(b.base_name)
                && name.len() > b.base_name.len()
                && name[b.base_name.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_models::ElementDefinition;
    use std::collections::HashMap as Map;

    fn el(path: &str, slice_name: Option<&str>) -> ElementDefinition {
        ElementDefinition {
            id: None,
            path: path.to_string(),
            representation: None,
            slice_name: slice_name.map(|s| s.to_string()),
            slice_is_constraining: None,
            short: None,
            definition: None,
            comment: None,
            requirements: None,
            alias: None,
            min: None,
            max: None,
            base: None,
            content_reference: None,
            types: None,
            meaning_when_missing: None,
            order_meaning: None,
            example: None,
            max_length: None,
            condition: None,
            constraint: None,
            is_modifier: None,
            is_modifier_reason: None,
            is_summary: None,
            binding: None,
            mapping: None,
            slicing: None,
            must_support: None,
            extensions: Map::new(),
        }
    }

    #[test]
    fn indexes_children_and_root() {
        let elements = vec![
            el("Patient", None),
            el("Patient.name", None),
            el("Patient.name.family", None),
        ];
        let index = ElementIndex::new(&elements);
        assert_eq!(index.root_path(), "Patient");
        assert_eq!(index.children_of("Patient").len(), 1);
        assert!(index.has_path("Patient.name.family"));
    }

    #[test]
    fn detects_choice_bases() {
        let elements = vec![el("Observation", None), el("Observation.value[x]", None)];
        let index = ElementIndex::new(&elements);
        assert_eq!(index.choice_bases_of("Observation").len(), 1);
        assert!(index.is_choice_variant_name("Observation", "valueQuantity"));
        assert!(!index.is_choice_variant_name("Observation", "valueXyz_not_uppercase_suffix"));
    }

    #[test]
    fn indexes_slices_separately_from_by_path() {
        let elements = vec![
            el("Patient.identifier", None),
            el("Patient.identifier", Some("mrn")),
        ];
        let index = ElementIndex::new(&elements);
        assert_eq!(index.slicing_at("Patient.identifier").len(), 1);
        assert!(index.has_path("Patient.identifier"));
    }
}
