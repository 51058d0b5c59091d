//! Reference literal validation: format, type consistency with
//! `targetProfile`, and (in `Full` mode) resolution against contained
//! resources and, for a `Bundle`, sibling entries by `fullUrl`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use meridian_context::FhirContext;
use meridian_snapshot::{ElementIndex, ExpandedFhirContext};
use serde_json::Value;

use crate::validator::{IssueCode, ValidationIssue};
use crate::{ReferenceMode, ReferencesPlan};

const SPECIAL_KEYS: &[&str] = &["resourceType", "id", "meta"];

enum ParsedReference<'a> {
    Relative { resource_type: &'a str, id: &'a str },
    Fragment(&'a str),
    Urn(&'a str),
    Absolute(&'a str),
    Invalid,
}

fn parse_reference(raw: &str) -> ParsedReference<'_> {
    if raw.is_empty() {
        return ParsedReference::Invalid;
    }
    if let Some(id) = raw.strip_prefix('#') {
        return if is_valid_id(id) {
            ParsedReference::Fragment(id)
        } else {
            ParsedReference::Invalid
        };
    }
    if raw.starts_with("urn:uuid:") {
        return ParsedReference::Urn(raw);
    }
    if let Some(oid) = raw.strip_prefix("urn:oid:") {
        return if is_valid_oid(oid) {
            ParsedReference::Urn(raw)
        } else {
            ParsedReference::Invalid
        };
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return ParsedReference::Absolute(raw);
    }

    let mut parts = raw.splitn(4, '/');
    let resource_type = parts.next().unwrap_or("");
    let id = parts.next().unwrap_or("");
    if !resource_type.is_empty()
        && resource_type.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && !id.is_empty()
        && is_valid_id(id)
    {
        ParsedReference::Relative { resource_type, id }
    } else {
        ParsedReference::Invalid
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Validates dotted-decimal OID grammar: two or more arcs, each either `0`
/// or a digit string with no leading zero.
fn is_valid_oid(oid: &str) -> bool {
    let arcs: Vec<&str> = oid.split('.').collect();
    arcs.len() >= 2
        && arcs.iter().all(|arc| {
            !arc.is_empty()
                && arc.chars().all(|c| c.is_ascii_digit())
                && (arc == &"0" || !arc.starts_with('0'))
        })
}

struct Scope {
    fullurl_types: HashMap<String, String>,
}

pub fn validate_references<C: FhirContext>(
    resource: &Value,
    plan: &ReferencesPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    if plan.mode == ReferenceMode::Off {
        return;
    }

    let Some(resource_type) = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return;
    };

    let scope = Scope {
        fullurl_types: collect_fullurl_types(resource, &resource_type),
    };

    walk_resource(resource, &resource_type, &scope, plan, context, issues);
}

fn collect_fullurl_types(resource: &Value, resource_type: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if resource_type != "Bundle" {
        return out;
    }
    let Some(entries) = resource.get("entry").and_then(Value::as_array) else {
        return out;
    };
    for entry in entries {
        let full_url = entry.get("fullUrl").and_then(Value::as_str);
        let rtype = entry
            .get("resource")
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str);
        if let (Some(url), Some(rtype)) = (full_url, rtype) {
            out.insert(url.to_string(), rtype.to_string());
        }
    }
    out
}

fn walk_resource<C: FhirContext>(
    resource: &Value,
    resource_type: &str,
    scope: &Scope,
    plan: &ReferencesPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let contained_ids: HashSet<&str> = resource
        .get("contained")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|c| c.get("id").and_then(Value::as_str))
        .collect();

    if let Some(sd) = resolve_expanded(context, resource_type, resource, resource_type) {
        if let Some(snapshot) = sd.snapshot.as_ref() {
            let index = ElementIndex::new(&snapshot.element);
            walk(
                resource,
                resource_type,
                &index,
                &contained_ids,
                scope,
                plan,
                context,
                issues,
            );
        }
    }

    if let Some(contained) = resource.get("contained").and_then(Value::as_array) {
        for child in contained {
            if let Some(child_type) = child.get("resourceType").and_then(Value::as_str) {
                walk_resource(child, child_type, scope, plan, context, issues);
            }
        }
    }

    if resource_type == "Bundle" {
        if let Some(entries) = resource.get("entry").and_then(Value::as_array) {
            for entry in entries {
                if let Some(entry_resource) = entry.get("resource") {
                    if let Some(entry_type) =
                        entry_resource.get("resourceType").and_then(Value::as_str)
                    {
                        walk_resource(entry_resource, entry_type, scope, plan, context, issues);
                    }
                }
            }
        }
    }
}

fn resolve_expanded<C: FhirContext>(
    context: &C,
    type_name: &str,
    probe: &Value,
    probe_path: &str,
) -> Option<Arc<meridian_models::StructureDefinition>> {
    let sd = context.structure_definition_for_type(type_name).ok()??;

    let needs_expansion = match sd.snapshot.as_ref() {
        None => true,
        Some(snapshot) => {
            let index = ElementIndex::new(&snapshot.element);
            snapshot_needs_expansion(probe, probe_path, &index)
        }
    };

    if !needs_expansion {
        return Some(sd);
    }

    let expanded = ExpandedFhirContext::borrowed(context);
    expanded.structure_definition_for_type(type_name).ok()?
}

fn snapshot_needs_expansion(resource: &Value, root_path: &str, index: &ElementIndex<'_>) -> bool {
    fn has_non_special_keys(obj: &serde_json::Map<String, Value>) -> bool {
        obj.keys().any(|k| {
            !SPECIAL_KEYS.contains(&k.as_str())
                && !k.starts_with('_')
                && k != "extension"
                && k != "modifierExtension"
        })
    }

    fn visit(value: &Value, path: &str, index: &ElementIndex<'_>) -> bool {
        match value {
            Value::Object(obj) => {
                for (key, child) in obj {
                    if SPECIAL_KEYS.contains(&key.as_str()) || key.starts_with('_') {
                        continue;
                    }
                    let child_path = format!("{}.{}", path, key);
                    if child.is_object() {
                        if index.has_path(&child_path)
                            && index.children_of(&child_path).is_empty()
                            && has_non_special_keys(child.as_object().unwrap())
                        {
                            return true;
                        }
                        if visit(child, &child_path, index) {
                            return true;
                        }
                    } else if let Some(arr) = child.as_array() {
                        let has_object_items = arr.iter().any(|v| v.is_object());
                        if has_object_items
                            && index.has_path(&child_path)
                            && index.children_of(&child_path).is_empty()
                        {
                            return true;
                        }
                        for item in arr {
                            if visit(item, &child_path, index) {
                                return true;
                            }
                        }
                    }
                }
                false
            }
            Value::Array(arr) => arr.iter().any(|v| visit(v, path, index)),
            _ => false,
        }
    }

    visit(resource, root_path, index)
}

#[allow(clippy::too_many_arguments)]
fn walk<C: FhirContext>(
    value: &Value,
    path: &str,
    index: &ElementIndex<'_>,
    contained_ids: &HashSet<&str>,
    scope: &Scope,
    plan: &ReferencesPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(obj) = value.as_object() else {
        return;
    };

    for (key, child_value) in obj {
        if SPECIAL_KEYS.contains(&key.as_str()) || key.starts_with('_') || key == "contained" {
            continue;
        }

        let child_path = format!("{}.{}", path, key);
        let def = index.element_at(&child_path).or_else(|| {
            index
                .choice_bases_of(path)
                .iter()
                .find(|b| {
                    key.starts_with(b.base_name)
                        && key.len() > b.base_name.len()
                        && key.as_bytes()[b.base_name.len()].is_ascii_uppercase()
                })
                .map(|b| b.element)
        });

        let Some(def) = def else {
            continue;
        };

        let is_reference = def
            .types
            .as_ref()
            .is_some_and(|types| types.iter().any(|t| t.code == "Reference"));

        let target_types = def.types.as_ref().and_then(|types| {
            types
                .iter()
                .find(|t| t.code == "Reference")
                .and_then(|t| t.target_profile.as_ref())
        });

        let items: Vec<&Value> = match child_value {
            Value::Array(arr) => arr.iter().collect(),
            Value::Null => continue,
            other => vec![other],
        };

        for item in items {
            if item.is_null() {
                continue;
            }
            if is_reference {
                check_reference(item, &child_path, target_types, contained_ids, scope, plan, context, issues);
            }
            if item.is_object() {
                walk(item, &child_path, index, contained_ids, scope, plan, context, issues);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_reference<C: FhirContext>(
    value: &Value,
    path: &str,
    target_profiles: Option<&Vec<String>>,
    contained_ids: &HashSet<&str>,
    scope: &Scope,
    plan: &ReferencesPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(raw) = value.get("reference").and_then(Value::as_str) else {
        return;
    };
    let declared_type = value.get("type").and_then(Value::as_str);

    let parsed = parse_reference(raw);
    if let Some(declared) = declared_type {
        let extracted = match &parsed {
            ParsedReference::Relative { resource_type, .. } => Some(*resource_type),
            ParsedReference::Absolute(url) => extract_type_from_absolute_url(url),
            ParsedReference::Urn(urn) => scope.fullurl_types.get(*urn).map(String::as_str),
            ParsedReference::Fragment(_) | ParsedReference::Invalid => None,
        };
        if let Some(extracted) = extracted {
            if extracted != declared {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Invalid,
                        format!(
                            "reference '{}' declares type '{}' but resolves to type '{}'",
                            raw, declared, extracted
                        ),
                    )
                    .with_location(path.to_string()),
                );
            }
        }
    }

    match parsed {
        ParsedReference::Invalid => {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Invalid,
                    format!("reference '{}' is not a recognized reference format", raw),
                )
                .with_location(path.to_string()),
            );
        }
        ParsedReference::Relative { resource_type, id: _ } => {
            if let Some(profiles) = target_profiles {
                let allowed = resolve_target_types(context, profiles);
                if !allowed.is_empty() && !allowed.contains(resource_type) {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::Invalid,
                            format!(
                                "reference '{}' targets type '{}', which is not among the allowed target types {:?}",
                                raw, resource_type, allowed
                            ),
                        )
                        .with_location(path.to_string()),
                    );
                }
            }
            if plan.mode == ReferenceMode::Full && !context.is_resource_type(resource_type) {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::NotFound,
                        format!(
                            "reference '{}' names '{}', which is not a known resource type",
                            raw, resource_type
                        ),
                    )
                    .with_location(path.to_string()),
                );
            }
        }
        ParsedReference::Fragment(id) => {
            if plan.mode == ReferenceMode::Full && !contained_ids.contains(id) {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::NotFound,
                        format!("contained reference '{}' has no matching contained resource", raw),
                    )
                    .with_location(path.to_string()),
                );
            }
        }
        ParsedReference::Urn(urn) => {
            if plan.mode == ReferenceMode::Full && !scope.fullurl_types.contains_key(urn) {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::NotFound,
                        format!("reference '{}' does not match any Bundle entry fullUrl", urn),
                    )
                    .with_location(path.to_string()),
                );
            }
        }
        ParsedReference::Absolute(url) => {
            if !plan.allow_external {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::BusinessRule,
                        format!("external reference '{}' is not permitted by configuration", url),
                    )
                    .with_location(path.to_string()),
                );
            }

            if let Some(resource_type) = extract_type_from_absolute_url(url) {
                if context.is_resource_type(resource_type) {
                    if let Some(profiles) = target_profiles {
                        let allowed = resolve_target_types(context, profiles);
                        if !allowed.is_empty() && !allowed.contains(resource_type) {
                            issues.push(
                                ValidationIssue::error(
                                    IssueCode::Invalid,
                                    format!(
                                        "reference '{}' targets type '{}', which is not among the allowed target types {:?}",
                                        raw, resource_type, allowed
                                    ),
                                )
                                .with_location(path.to_string()),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Extracts the resource type from an absolute reference URL by taking the
/// penultimate path segment (`.../fhir/Patient/123` -> `Patient`), per
/// §4.9's "Absolute" reference form.
fn extract_type_from_absolute_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    segments.pop();
    segments.pop()
}

fn resolve_target_types<C: FhirContext>(context: &C, target_profiles: &[String]) -> HashSet<String> {
    let mut out = HashSet::new();
    for profile in target_profiles {
        if let Ok(Some(sd)) = context.get_structure_definition(profile) {
            out.insert(sd.type_.clone());
        } else if let Some(name) = profile.rsplit('/').next() {
            out.insert(name.to_string());
        }
    }
    out
}
