//! Sanity checks for ingested FHIR snapshots
//!
//! These are cheap structural checks applied when a `StructureDefinition` is
//! registered with the conformance registry, independent of validating any
//! particular resource instance against it.

use crate::error::{Error, Result};
use meridian_models::Differential;
use meridian_models::ElementDefinition;
use meridian_models::Snapshot;

/// Validate that elements are in lexicographic/hierarchical order
fn validate_element_order(elements: &[ElementDefinition]) -> Result<()> {
    for i in 1..elements.len() {
        let prev_path = &elements[i - 1].path;
        let curr_path = &elements[i].path;

        if prev_path > curr_path && !is_slice_after_base(&elements[i - 1], &elements[i]) {
            return Err(Error::Snapshot(format!(
                "Elements not in order: '{}' comes before '{}'",
                prev_path, curr_path
            )));
        }
    }
    Ok(())
}

/// Check if the previous element is a slice of the current element's path
fn is_slice_after_base(prev: &ElementDefinition, curr: &ElementDefinition) -> bool {
    prev.is_slice() && prev.path == curr.path && !curr.is_slice()
}

/// Validate snapshot hierarchy - every element's parent must appear earlier
fn validate_snapshot_hierarchy(elements: &[ElementDefinition]) -> Result<()> {
    for (i, elem) in elements.iter().enumerate() {
        if let Some(parent_path) = elem.parent_path() {
            let parent_found = elements[..i].iter().any(|e| e.path == parent_path);
            if !parent_found {
                return Err(Error::Snapshot(format!(
                    "Element '{}' appears before its parent '{}'",
                    elem.path, parent_path
                )));
            }
        }
    }
    Ok(())
}

/// Validate a snapshot's structural shape before it is indexed
pub fn validate_snapshot(snapshot: &Snapshot) -> Result<()> {
    if snapshot.element.is_empty() {
        return Err(Error::Snapshot(
            "Snapshot must have at least one element".into(),
        ));
    }

    let root = &snapshot.element[0];
    if root.path.contains('.') {
        return Err(Error::Snapshot(format!(
            "First element must be root, got '{}'",
            root.path
        )));
    }

    validate_element_order(&snapshot.element)?;
    validate_snapshot_hierarchy(&snapshot.element)?;

    Ok(())
}

/// Validate a differential's structural shape. Differentials need not start
/// at the root and may omit intermediate elements, so only ordering (not
/// hierarchy-completeness) is checked.
pub fn validate_differential(differential: &Differential) -> Result<()> {
    if differential.element.is_empty() {
        return Err(Error::Differential(
            "Differential must have at least one element".into(),
        ));
    }
    validate_element_order(&differential.element)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_element(path: &str, slice_name: Option<&str>) -> ElementDefinition {
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
            extensions: HashMap::new(),
        }
    }

    #[test]
    fn validates_correct_order() {
        let elements = vec![
            make_element("Patient", None),
            make_element("Patient.name", None),
            make_element("Patient.name.family", None),
        ];
        assert!(validate_element_order(&elements).is_ok());
    }

    #[test]
    fn allows_slices_after_base() {
        let elements = vec![
            make_element("Patient.name", None),
            make_element("Patient.name", Some("official")),
        ];
        assert!(validate_element_order(&elements).is_ok());
    }

    #[test]
    fn validates_snapshot() {
        let snapshot = Snapshot {
            element: vec![
                make_element("Patient", None),
                make_element("Patient.name", None),
            ],
        };
        assert!(validate_snapshot(&snapshot).is_ok());
    }

    #[test]
    fn rejects_snapshot_without_root() {
        let snapshot = Snapshot {
            element: vec![make_element("Patient.name", None)],
        };
        assert!(validate_snapshot(&snapshot).is_err());
    }

    #[test]
    fn rejects_child_before_parent() {
        let snapshot = Snapshot {
            element: vec![
                make_element("Patient", None),
                make_element("Patient.name.family", None),
            ],
        };
        assert!(validate_snapshot(&snapshot).is_err());
    }
}
