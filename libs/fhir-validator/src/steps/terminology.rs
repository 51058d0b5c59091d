//! Binding (terminology) validation: codes on bound elements are checked
//! against the value set(s) reachable from the registered conformance
//! resources. There is no external terminology service client here — `Local`
//! and `Remote` modes both resolve strictly from whatever `ValueSet`/
//! `CodeSystem` the context has registered; "remote" distinguishes intent at
//! the config layer, not transport.

use std::collections::HashSet;
use std::sync::Arc;

use meridian_context::FhirContext;
use meridian_models::common::complex::BindingStrength;
use meridian_models::common::element_definition::ElementDefinitionBinding;
use meridian_models::common::value_set::{ValueSet, ValueSetExpansionContains};
use meridian_snapshot::{ElementIndex, ExpandedFhirContext};
use serde_json::Value;

use crate::validator::{IssueCode, ValidationIssue};
use crate::{ExtensibleHandling, TerminologyMode, TerminologyPlan};

const SPECIAL_KEYS: &[&str] = &["resourceType", "id", "meta"];

pub fn validate_terminology<C: FhirContext>(
    resource: &Value,
    plan: &TerminologyPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    if plan.mode == TerminologyMode::Off {
        return;
    }

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
    walk(resource, &resource_type, &index, plan, context, issues);
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

fn walk<C: FhirContext>(
    value: &Value,
    path: &str,
    index: &ElementIndex<'_>,
    plan: &TerminologyPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(def) = index.element_at(path) {
        if let Some(binding) = def.binding.as_ref() {
            evaluate_binding(value, path, binding, plan, context, issues);
        }
    }

    let Some(obj) = value.as_object() else {
        return;
    };

    for (key, child_value) in obj {
        if SPECIAL_KEYS.contains(&key.as_str()) || key.starts_with('_') {
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
            if let Some(binding) = def.binding.as_ref() {
                evaluate_binding(item, &child_path, binding, plan, context, issues);
            }
            if item.is_object() {
                walk(item, &child_path, index, plan, context, issues);
            }
        }
    }
}

struct ExtractedCode {
    system: Option<String>,
    code: Option<String>,
}

/// Pulls candidate codes out of `value`, which may be a bare `code` string,
/// a `Coding`, or a `CodeableConcept` (one entry per `coding`).
fn extract_codes(value: &Value) -> Vec<ExtractedCode> {
    match value {
        Value::String(s) => vec![ExtractedCode {
            system: None,
            code: Some(s.clone()),
        }],
        Value::Object(obj) => {
            if let Some(codings) = obj.get("coding").and_then(Value::as_array) {
                codings.iter().filter_map(coding_from_value).collect()
            } else if obj.contains_key("system") || obj.contains_key("code") {
                coding_from_value(value).into_iter().collect()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn coding_from_value(v: &Value) -> Option<ExtractedCode> {
    let code = v.get("code").and_then(Value::as_str).map(str::to_string);
    let system = v.get("system").and_then(Value::as_str).map(str::to_string);
    if code.is_none() && system.is_none() {
        return None;
    }
    Some(ExtractedCode { system, code })
}

fn evaluate_binding<C: FhirContext>(
    value: &Value,
    path: &str,
    binding: &ElementDefinitionBinding,
    plan: &TerminologyPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(vs_url) = binding.value_set.as_deref() else {
        return;
    };
    let vs_url = vs_url.split('|').next().unwrap_or(vs_url);

    let codes = extract_codes(value);
    if codes.is_empty() {
        return;
    }

    let vs = match context.get_value_set(vs_url) {
        Ok(Some(vs)) => vs,
        Ok(None) => {
            if binding.strength == BindingStrength::Required {
                issues.push(
                    ValidationIssue::information(
                        IssueCode::NotFound,
                        format!("unable to resolve required value set '{}'", vs_url),
                    )
                    .with_location(path.to_string()),
                );
            }
            return;
        }
        Err(_) => return,
    };

    let expanded = expand_codes(context, &vs);
    let known_systems: HashSet<&str> = expanded.iter().map(|(s, _)| s.as_str()).collect();

    for extracted in &codes {
        let Some(code) = extracted.code.as_deref() else {
            continue;
        };

        let in_set = match &extracted.system {
            Some(system) => expanded.contains(&(system.clone(), code.to_string())),
            None => expanded.iter().any(|(_, c)| c == code),
        };

        if in_set {
            continue;
        }

        match binding.strength {
            BindingStrength::Required => {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::CodeInvalid,
                        format!(
                            "code '{}' is not in the required value set '{}'",
                            code, vs_url
                        ),
                    )
                    .with_location(path.to_string()),
                );
            }
            BindingStrength::Extensible => {
                let system_known = extracted
                    .system
                    .as_deref()
                    .map(|s| known_systems.contains(s))
                    .unwrap_or(false);

                if system_known {
                    let diagnostics = format!(
                        "code '{}' is not in the extensible value set '{}'",
                        code, vs_url
                    );
                    let issue = match plan.extensible_handling {
                        ExtensibleHandling::Error => {
                            ValidationIssue::error(IssueCode::CodeInvalid, diagnostics)
                        }
                        ExtensibleHandling::Warn => {
                            ValidationIssue::warning(IssueCode::CodeInvalid, diagnostics)
                        }
                    };
                    issues.push(issue.with_location(path.to_string()));
                } else {
                    issues.push(
                        ValidationIssue::information(
                            IssueCode::CodeInvalid,
                            format!(
                                "code '{}' could not be checked against extensible value set '{}': system not resolvable",
                                code, vs_url
                            ),
                        )
                        .with_location(path.to_string()),
                    );
                }
            }
            BindingStrength::Preferred | BindingStrength::Example => {}
        }
    }
}

fn expand_codes<C: FhirContext>(context: &C, vs: &ValueSet) -> HashSet<(String, String)> {
    let mut out = HashSet::new();

    if let Some(expansion) = &vs.expansion {
        if let Some(contains) = &expansion.contains {
            collect_expansion(contains, &mut out);
            return out;
        }
    }

    if let Some(compose) = &vs.compose {
        for include in &compose.include {
            expand_include(context, include, &mut out);
        }
    }

    out
}

fn collect_expansion(contains: &[ValueSetExpansionContains], out: &mut HashSet<(String, String)>) {
    for entry in contains {
        if let (Some(system), Some(code)) = (&entry.system, &entry.code) {
            out.insert((system.clone(), code.clone()));
        }
        if let Some(children) = &entry.contains {
            collect_expansion(children, out);
        }
    }
}

fn expand_include<C: FhirContext>(
    context: &C,
    include: &meridian_models::common::value_set::ValueSetInclude,
    out: &mut HashSet<(String, String)>,
) {
    let Some(system) = include.system.clone() else {
        return;
    };

    if let Some(concepts) = &include.concept {
        for concept in concepts {
            out.insert((system.clone(), concept.code.clone()));
        }
        return;
    }

    let Ok(Some(cs)) = context.get_code_system(&system) else {
        return;
    };

    let is_a_roots: Vec<&str> = include
        .filter
        .as_ref()
        .into_iter()
        .flatten()
        .filter(|f| f.op == "is-a" || f.op == "=")
        .map(|f| f.value.as_str())
        .collect();

    let Some(concepts) = cs.concept.as_ref() else {
        return;
    };

    if is_a_roots.is_empty() {
        collect_all_concepts(concepts, &system, out);
    } else {
        for root in &is_a_roots {
            collect_is_a(concepts, &system, root, out, false);
        }
    }
}

fn collect_all_concepts(
    concepts: &[meridian_models::common::code_system::CodeSystemConcept],
    system: &str,
    out: &mut HashSet<(String, String)>,
) {
    for concept in concepts {
        out.insert((system.to_string(), concept.code.clone()));
        if let Some(children) = &concept.concept {
            collect_all_concepts(children, system, out);
        }
    }
}

fn collect_is_a(
    concepts: &[meridian_models::common::code_system::CodeSystemConcept],
    system: &str,
    root: &str,
    out: &mut HashSet<(String, String)>,
    within: bool,
) {
    for concept in concepts {
        let matched = within || concept.code == root;
        if matched {
            out.insert((system.to_string(), concept.code.clone()));
        }
        if let Some(children) = &concept.concept {
            collect_is_a(children, system, root, out, matched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CachePolicy, TimeoutPolicy};
    use meridian_context::DefaultFhirContext;
    use serde_json::json;
    use std::time::Duration;

    fn plan(extensible: ExtensibleHandling) -> TerminologyPlan {
        TerminologyPlan {
            mode: TerminologyMode::Local,
            extensible_handling: extensible,
            timeout: Duration::from_millis(5000),
            on_timeout: TimeoutPolicy::Warn,
            cache: CachePolicy::Enabled,
        }
    }

    fn observation_sd() -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/Observation",
            "name": "Observation",
            "status": "active",
            "kind": "resource",
            "abstract": false,
            "type": "Observation",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/DomainResource",
            "snapshot": {
                "element": [
                    {"path": "Observation", "min": 0, "max": "1"},
                    {
                        "path": "Observation.status",
                        "min": 1,
                        "max": "1",
                        "type": [{"code": "code"}],
                        "binding": {
                            "strength": "required",
                            "valueSet": "http://example.org/ValueSet/obs-status"
                        }
                    }
                ]
            }
        })
    }

    fn status_value_set() -> Value {
        json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/ValueSet/obs-status",
            "status": "active",
            "compose": {
                "include": [
                    {
                        "system": "http://hl7.org/fhir/observation-status",
                        "concept": [
                            {"code": "final"},
                            {"code": "preliminary"}
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn required_binding_accepts_known_code() {
        let ctx = DefaultFhirContext::new();
        ctx.register(observation_sd()).unwrap();
        ctx.register(status_value_set()).unwrap();

        let mut issues = Vec::new();
        validate_terminology(
            &json!({"resourceType": "Observation", "status": "final"}),
            &plan(ExtensibleHandling::Warn),
            &ctx,
            &mut issues,
        );

        assert!(issues.is_empty());
    }

    #[test]
    fn required_binding_flags_unknown_code() {
        let ctx = DefaultFhirContext::new();
        ctx.register(observation_sd()).unwrap();
        ctx.register(status_value_set()).unwrap();

        let mut issues = Vec::new();
        validate_terminology(
            &json!({"resourceType": "Observation", "status": "bogus"}),
            &plan(ExtensibleHandling::Warn),
            &ctx,
            &mut issues,
        );

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::CodeInvalid);
    }

    #[test]
    fn off_mode_skips_validation_entirely() {
        let ctx = DefaultFhirContext::new();
        ctx.register(observation_sd()).unwrap();
        ctx.register(status_value_set()).unwrap();

        let mut p = plan(ExtensibleHandling::Warn);
        p.mode = TerminologyMode::Off;

        let mut issues = Vec::new();
        validate_terminology(
            &json!({"resourceType": "Observation", "status": "bogus"}),
            &p,
            &ctx,
            &mut issues,
        );

        assert!(issues.is_empty());
    }
}
