//! FHIRPath invariant evaluation against `ElementDefinition.constraint`.
//!
//! Constraints are attached to the same flattened per-resource-type snapshot
//! the schema step walks, so this module repeats that walk rather than
//! sharing it: each phase owns the tree it walks so none of them carry state
//! across another phase's traversal.

use std::sync::Arc;

use meridian_context::FhirContext;
use meridian_fhirpath::{Context as FhirPathContext, EvalOptions, Engine as FhirPathEngine};
use meridian_models::common::element_definition::ElementDefinitionConstraint;
use meridian_snapshot::{ElementIndex, ExpandedFhirContext};
use serde_json::Value;

use crate::validator::{IssueCode, IssueSeverity, ValidationIssue};
use crate::{BestPracticeMode, ConstraintsPlan};

const SPECIAL_KEYS: &[&str] = &["resourceType", "id", "meta"];

/// Evaluates every reachable `ElementDefinition.constraint` against the
/// resource's own base type snapshot.
pub fn validate_constraints<C: FhirContext>(
    resource: &Value,
    plan: &ConstraintsPlan,
    context: &C,
    fhirpath_engine: &Arc<FhirPathEngine>,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(resource_type) = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return;
    };

    let Some(sd) = resolve_expanded(context, &resource_type, resource, &resource_type) else {
        return;
    };

    let Some(snapshot) = sd.snapshot.as_ref() else {
        return;
    };

    let index = ElementIndex::new(&snapshot.element);
    walk(resource, &resource_type, &index, plan, fhirpath_engine, issues);
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
            !SPECIAL_KEYS.contains(&k.as_str()) && !k.starts_with('_') && k != "extension" && k != "modifierExtension"
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

/// Evaluates constraints on `value` at `path`, then recurses into its children.
fn walk(
    value: &Value,
    path: &str,
    index: &ElementIndex<'_>,
    plan: &ConstraintsPlan,
    fhirpath_engine: &Arc<FhirPathEngine>,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(def) = index.element_at(path) {
        evaluate_constraints(value, path, def, plan, fhirpath_engine, issues);
    }

    let Some(obj) = value.as_object() else {
        return;
    };

    for (key, child_value) in obj {
        if SPECIAL_KEYS.contains(&key.as_str()) || key.starts_with('_') {
            continue;
        }
        if key == "extension" || key == "modifierExtension" {
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

        let items: Vec<&Value> = match child_value {
            Value::Array(arr) => arr.iter().collect(),
            Value::Null => continue,
            other => vec![other],
        };

        for item in items {
            if item.is_null() {
                continue;
            }
            evaluate_constraints(item, &child_path, def, plan, fhirpath_engine, issues);
            if item.is_object() {
                walk_children(item, &child_path, index, plan, fhirpath_engine, issues);
            }
        }
    }
}

/// Like [`walk`], but doesn't re-evaluate constraints on `value` itself
/// (already done by the caller against the item, not the collection).
fn walk_children(
    value: &Value,
    path: &str,
    index: &ElementIndex<'_>,
    plan: &ConstraintsPlan,
    fhirpath_engine: &Arc<FhirPathEngine>,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(obj) = value.as_object() else {
        return;
    };

    for (key, child_value) in obj {
        if SPECIAL_KEYS.contains(&key.as_str()) || key.starts_with('_') {
            continue;
        }
        if key == "extension" || key == "modifierExtension" {
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

        let items: Vec<&Value> = match child_value {
            Value::Array(arr) => arr.iter().collect(),
            Value::Null => continue,
            other => vec![other],
        };

        for item in items {
            if item.is_null() {
                continue;
            }
            evaluate_constraints(item, &child_path, def, plan, fhirpath_engine, issues);
            if item.is_object() {
                walk_children(item, &child_path, index, plan, fhirpath_engine, issues);
            }
        }
    }
}

fn evaluate_constraints(
    value: &Value,
    path: &str,
    def: &meridian_models::ElementDefinition,
    plan: &ConstraintsPlan,
    fhirpath_engine: &Arc<FhirPathEngine>,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(constraints) = def.constraint.as_ref() else {
        return;
    };

    for constraint in constraints {
        if plan.suppress.iter().any(|s| s == &constraint.key) {
            continue;
        }

        let Some(severity) = resolve_severity(constraint, plan) else {
            continue;
        };

        let Some(expression) = constraint.expression.as_deref() else {
            continue;
        };

        let ctx = FhirPathContext::new(value.clone());
        match fhirpath_engine.evaluate_str(expression, &ctx, &EvalOptions::default()) {
            Ok(result) => {
                if !result.to_boolean() {
                    issues.push(
                        build_issue(
                            severity,
                            format!("{}: {}", constraint.key, constraint.human),
                        )
                        .with_location(path.to_string())
                        .with_expression(vec![expression.to_string()]),
                    );
                }
            }
            Err(err) => {
                issues.push(
                    ValidationIssue::warning(
                        IssueCode::Invariant,
                        format!("{}: evaluation error: {}", constraint.key, err),
                    )
                    .with_location(path.to_string())
                    .with_expression(vec![expression.to_string()]),
                );
            }
        }
    }
}

/// Resolves the effective severity for one constraint, honoring a
/// per-key override first, then best-practice reclassification, then the
/// constraint's own declared severity. `None` means skip entirely (a
/// best-practice constraint under `BestPracticeMode::Ignore`).
fn resolve_severity(
    constraint: &ElementDefinitionConstraint,
    plan: &ConstraintsPlan,
) -> Option<IssueSeverity> {
    if let Some(over) = plan.level_overrides.iter().find(|o| o.key == constraint.key) {
        return Some(over.severity);
    }

    if constraint.is_best_practice() {
        return match plan.best_practice {
            BestPracticeMode::Ignore => None,
            BestPracticeMode::Warn => Some(IssueSeverity::Warning),
            BestPracticeMode::Error => Some(IssueSeverity::Error),
        };
    }

    Some(match constraint.severity {
        meridian_models::common::element_definition::ConstraintSeverity::Error => IssueSeverity::Error,
        meridian_models::common::element_definition::ConstraintSeverity::Warning => IssueSeverity::Warning,
    })
}

fn build_issue(severity: IssueSeverity, diagnostics: String) -> ValidationIssue {
    match severity {
        IssueSeverity::Fatal | IssueSeverity::Error => {
            ValidationIssue::error(IssueCode::Invariant, diagnostics)
        }
        IssueSeverity::Warning => ValidationIssue::warning(IssueCode::Invariant, diagnostics),
        IssueSeverity::Information => ValidationIssue::information(IssueCode::Invariant, diagnostics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BestPracticeMode, ConstraintsMode};
    use meridian_context::DefaultFhirContext;
    use serde_json::json;

    fn plan() -> ConstraintsPlan {
        ConstraintsPlan {
            mode: ConstraintsMode::Full,
            best_practice: BestPracticeMode::Warn,
            suppress: Vec::new(),
            level_overrides: Vec::new(),
        }
    }

    fn patient_sd_with_constraint() -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/Patient",
            "name": "Patient",
            "status": "active",
            "kind": "resource",
            "abstract": false,
            "type": "Patient",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/DomainResource",
            "snapshot": {
                "element": [
                    {
                        "path": "Patient",
                        "min": 0,
                        "max": "1",
                        "constraint": [
                            {
                                "key": "pat-1",
                                "severity": "error",
                                "human": "Patient must have a name",
                                "expression": "name.exists()"
                            }
                        ]
                    },
                    {"path": "Patient.name", "min": 0, "max": "*", "type": [{"code": "HumanName"}]}
                ]
            }
        })
    }

    #[test]
    fn flags_failing_invariant() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd_with_constraint()).unwrap();
        let engine = Arc::new(FhirPathEngine::new());

        let mut issues = Vec::new();
        validate_constraints(
            &json!({"resourceType": "Patient"}),
            &plan(),
            &ctx,
            &engine,
            &mut issues,
        );

        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Invariant && i.diagnostics.contains("pat-1")));
    }

    #[test]
    fn passing_invariant_produces_no_issue() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd_with_constraint()).unwrap();
        let engine = Arc::new(FhirPathEngine::new());

        let mut issues = Vec::new();
        validate_constraints(
            &json!({"resourceType": "Patient", "name": [{"family": "Doe"}]}),
            &plan(),
            &ctx,
            &engine,
            &mut issues,
        );

        assert!(issues.is_empty());
    }

    #[test]
    fn suppressed_constraint_key_is_skipped() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd_with_constraint()).unwrap();
        let engine = Arc::new(FhirPathEngine::new());

        let mut p = plan();
        p.suppress.push("pat-1".to_string());

        let mut issues = Vec::new();
        validate_constraints(&json!({"resourceType": "Patient"}), &p, &ctx, &engine, &mut issues);

        assert!(issues.is_empty());
    }
}
