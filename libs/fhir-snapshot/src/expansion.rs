//! Deep snapshot expansion
//!
//! A `StructureDefinition.snapshot` only lists the element's own complex-type
//! children up to one level; e.g. `Patient.name` is present, but
//! `Patient.name.given` is not, because `name` is typed `HumanName` and its
//! children live in `HumanName`'s own snapshot. Deep expansion splices a
//! referenced type's elements in under the referencing element's path so the
//! Structural phase can see (and reject unknown elements within) nested
//! complex-type content.

use std::collections::HashSet;

use meridian_context::FhirContext;
use meridian_models::{ElementDefinition, Snapshot};

use crate::element_index::ElementIndex;
use crate::error::{Error, Result};

const MAX_DEPTH: usize = 12;

/// Returns the deep-expanded snapshot, or `None` if `snapshot` needs no
/// expansion (every complex-type leaf already has children indexed).
pub fn expand_snapshot(snapshot: &Snapshot, context: &dyn FhirContext) -> Result<Snapshot> {
    let index = ElementIndex::new(&snapshot.element);
    let mut elements = snapshot.element.clone();
    let mut extra = Vec::new();

    for element in &snapshot.element {
        if element.slice_name.is_some() {
            continue;
        }
        if !index.children_of(&element.path).is_empty() {
            continue;
        }
        let Some(type_name) = single_complex_type(context, element) else {
            continue;
        };
        let mut ancestors = HashSet::new();
        extra.extend(expand_type_under(
            context,
            &type_name,
            &element.path,
            &mut ancestors,
            0,
        )?);
    }

    if extra.is_empty() {
        return Ok(Snapshot { element: elements });
    }
    elements.extend(extra);
    Ok(Snapshot { element: elements })
}

fn single_complex_type(context: &dyn FhirContext, element: &ElementDefinition) -> Option<String> {
    let types = element.types.as_ref()?;
    if types.len() != 1 {
        return None;
    }
    let code = types[0].code.clone();
    if code == "BackboneElement" || code == "Element" {
        return None;
    }
    if context.is_primitive_type(&code) {
        return None;
    }
    Some(code)
}

fn expand_type_under(
    context: &dyn FhirContext,
    type_name: &str,
    target_path: &str,
    ancestors: &mut HashSet<String>,
    depth: usize,
) -> Result<Vec<ElementDefinition>> {
    if depth >= MAX_DEPTH || ancestors.contains(type_name) {
        return Ok(Vec::new());
    }

    let Some(sd) = context.structure_definition_for_type(type_name).map_err(|e| {
        Error::Expansion(format!("failed to resolve type '{}': {}", type_name, e))
    })?
    else {
        return Ok(Vec::new());
    };
    let Some(snapshot) = sd.snapshot.as_ref() else {
        return Ok(Vec::new());
    };

    let index = ElementIndex::new(&snapshot.element);
    let root = index.root_path().to_string();
    ancestors.insert(type_name.to_string());

    let mut result = Vec::new();
    for child in index.children_of(&root) {
        let rebased_path = format!("{}{}", target_path, &child.path[root.len()..]);
        let mut rebased = (*child).clone();
        rebased.path = rebased_path.clone();
        rebased.id = Some(rebased_path.clone());

        if index.children_of(&child.path).is_empty() {
            if let Some(nested_type) = single_complex_type(context, &rebased) {
                let nested = expand_type_under(
                    context,
                    &nested_type,
                    &rebased_path,
                    ancestors,
                    depth + 1,
                )?;
                result.push(rebased);
                result.extend(nested);
                continue;
            }
        }
        result.push(rebased);
    }

    ancestors.remove(type_name);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_context::DefaultFhirContext;
    use serde_json::json;

    fn human_name_sd() -> serde_json::Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/HumanName",
            "name": "HumanName",
            "status": "active",
            "kind": "complex-type",
            "abstract": false,
            "type": "HumanName",
            "snapshot": {
                "element": [
                    { "id": "HumanName", "path": "HumanName" },
                    { "id": "HumanName.family", "path": "HumanName.family", "min": 0, "max": "1", "type": [{ "code": "string" }] },
                    { "id": "HumanName.given", "path": "HumanName.given", "min": 0, "max": "*", "type": [{ "code": "string" }] }
                ]
            }
        })
    }

    fn string_sd() -> serde_json::Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/string",
            "name": "string",
            "status": "active",
            "kind": "primitive-type",
            "abstract": false,
            "type": "string"
        })
    }

    #[test]
    fn splices_nested_complex_type_children() {
        let ctx = DefaultFhirContext::new();
        ctx.register(human_name_sd()).unwrap();
        ctx.register(string_sd()).unwrap();

        let snapshot = Snapshot {
            element: vec![
                serde_json::from_value(json!({ "id": "Patient", "path": "Patient" })).unwrap(),
                serde_json::from_value(json!({
                    "id": "Patient.name", "path": "Patient.name",
                    "min": 0, "max": "*", "type": [{ "code": "HumanName" }]
                }))
                .unwrap(),
            ],
        };

        let expanded = expand_snapshot(&snapshot, &ctx).unwrap();
        let index = ElementIndex::new(&expanded.element);
        assert!(index.has_path("Patient.name.given"));
        assert!(index.has_path("Patient.name.family"));
    }

    #[test]
    fn leaves_already_expanded_snapshots_untouched() {
        let ctx = DefaultFhirContext::new();
        let snapshot = Snapshot {
            element: vec![
                serde_json::from_value(json!({ "id": "Patient", "path": "Patient" })).unwrap(),
                serde_json::from_value(json!({
                    "id": "Patient.name", "path": "Patient.name",
                    "min": 0, "max": "*", "type": [{ "code": "HumanName" }]
                }))
                .unwrap(),
                serde_json::from_value(json!({
                    "id": "Patient.name.given", "path": "Patient.name.given",
                    "min": 0, "max": "*", "type": [{ "code": "string" }]
                }))
                .unwrap(),
            ],
        };

        let expanded = expand_snapshot(&snapshot, &ctx).unwrap();
        assert_eq!(expanded.element.len(), snapshot.element.len());
    }
}
