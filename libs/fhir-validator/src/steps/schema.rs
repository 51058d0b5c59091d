//! Structural, cardinality, and primitive-type validation against a
//! resource's own base `StructureDefinition`.
//!
//! Unlike the profile step, this never switches `StructureDefinition`
//! partway through a resource: FHIR core snapshots already flatten every
//! descendant element (including those contributed by complex datatypes like
//! `HumanName`) under the resource's own dotted paths, so one
//! [`ElementIndex`] covers the whole tree. `BackboneElement` children are
//! just further entries in that same snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use meridian_context::FhirContext;
use meridian_snapshot::{ElementIndex, ExpandedFhirContext};
use regex::Regex;
use serde_json::Value;

use crate::validator::{IssueCode, ValidationIssue};
use crate::SchemaPlan;

const SPECIAL_KEYS: &[&str] = &["resourceType", "id", "meta"];

/// Validates structure, cardinality, and primitive formats against the
/// resource's own base type - no profile involved.
pub fn validate_schema<C: FhirContext>(
    resource: &Value,
    plan: &SchemaPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(resource_type) = get_resource_type(resource) else {
        issues.push(ValidationIssue::error(
            IssueCode::Structure,
            "Resource is missing 'resourceType'".to_string(),
        ));
        return;
    };

    let Some(sd) = resolve_expanded(context, &resource_type, resource, &resource_type) else {
        issues.push(ValidationIssue::error(
            IssueCode::Structure,
            format!("Unknown resourceType '{}'", resource_type),
        ));
        return;
    };

    let Some(snapshot) = sd.snapshot.as_ref() else {
        issues.push(ValidationIssue::error(
            IssueCode::Exception,
            format!("Base type '{}' has no snapshot", resource_type),
        ));
        return;
    };

    let index = ElementIndex::new(&snapshot.element);
    validate_object(resource, &resource_type, &index, plan, context, issues);
}

/// Resolves a type's `StructureDefinition`, deep-expanding it if the
/// instance needs children the shallow snapshot doesn't carry yet.
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

/// Walks one object node: unknown-element detection, choice-type
/// resolution, cardinality, and recursion/primitive dispatch for its
/// children.
fn validate_object<C: FhirContext>(
    value: &Value,
    path: &str,
    index: &ElementIndex<'_>,
    plan: &SchemaPlan,
    context: &C,
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
            validate_extension_presence(
                child_value,
                path,
                key == "modifierExtension",
                plan,
                context,
                issues,
            );
            continue;
        }

        let child_path = format!("{}.{}", path, key);

        if let Some(def) = index.element_at(&child_path) {
            dispatch_child(child_value, &child_path, def, index, plan, context, issues);
            continue;
        }

        if let Some(base) = index.choice_bases_of(path).iter().find(|b| {
            key.starts_with(b.base_name)
                && key.len() > b.base_name.len()
                && key.as_bytes()[b.base_name.len()].is_ascii_uppercase()
        }) {
            let suffix = &key[base.base_name.len()..];
            if !base
                .element
                .type_codes()
                .iter()
                .any(|code| code.eq_ignore_ascii_case(suffix))
            {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Structure,
                        format!(
                            "'{}' is not a recognized variant of choice element '{}[x]'",
                            key, base.base_name
                        ),
                    )
                    .with_location(child_path.clone())
                    .with_expression(vec![child_path.clone()]),
                );
                continue;
            }
            dispatch_child(child_value, &child_path, base.element, index, plan, context, issues);
            continue;
        }

        if !plan.allow_unknown_elements {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Structure,
                    format!("Unknown element '{}'", key),
                )
                .with_location(child_path.clone())
                .with_expression(vec![child_path]),
            );
        }
    }

    validate_cardinality_and_choice_exclusivity(obj, path, index, issues);
}

fn dispatch_child<C: FhirContext>(
    value: &Value,
    path: &str,
    def: &meridian_models::ElementDefinition,
    index: &ElementIndex<'_>,
    plan: &SchemaPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let items: Vec<&Value> = match value {
        Value::Array(arr) => arr.iter().collect(),
        Value::Null => return,
        other => vec![other],
    };

    let type_code = def.type_codes().into_iter().next();

    for item in items {
        if item.is_null() {
            continue;
        }
        if item.is_object() {
            validate_object(item, path, index, plan, context, issues);
        }
        if let Some(ref code) = type_code {
            if context.is_primitive_type(code) {
                validate_primitive(item, code, path, context, issues);
            }
        }
    }
}

fn validate_extension_presence<C: FhirContext>(
    value: &Value,
    parent_path: &str,
    is_modifier: bool,
    plan: &SchemaPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(arr) = value.as_array() else {
        return;
    };

    for (i, ext) in arr.iter().enumerate() {
        let location = format!("{}.{}[{}]", parent_path, if is_modifier { "modifierExtension" } else { "extension" }, i);
        let url = ext
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty());

        let Some(url) = url else {
            issues.push(
                ValidationIssue::error(IssueCode::Structure, "Extension is missing 'url'".to_string())
                    .with_location(location.clone())
                    .with_expression(vec![location]),
            );
            continue;
        };

        if is_modifier && !plan.allow_modifier_extensions {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Extension,
                    "modifierExtension is not permitted by this configuration".to_string(),
                )
                .with_location(location.clone())
                .with_expression(vec![location]),
            );
        }

        validate_extension_definition(
            ext, &location, url, parent_path, is_modifier, plan, context, issues,
        );
    }
}

/// Resolves an extension's own `StructureDefinition` and, if found, checks
/// its declared `context` against where it was used and recurses into its
/// own cardinality/type rules the same way a resource's own elements are
/// checked. An unresolvable `extension` url is a warning; an unresolvable
/// `modifierExtension` url is an error, since a caller cannot safely ignore
/// an unrecognized modifier.
fn validate_extension_definition<C: FhirContext>(
    ext: &Value,
    location: &str,
    url: &str,
    parent_path: &str,
    is_modifier: bool,
    plan: &SchemaPlan,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let canonical = url.split('#').next().unwrap_or(url);
    let expanded = ExpandedFhirContext::borrowed(context);
    let Ok(Some(sd)) = expanded.get_structure_definition(canonical) else {
        let message = format!("Unknown extension '{}'", url);
        let issue = if is_modifier {
            ValidationIssue::error(IssueCode::Extension, message)
        } else {
            ValidationIssue::warning(IssueCode::Extension, message)
        };
        issues.push(issue.with_location(location.to_string()).with_expression(vec![location.to_string()]));
        return;
    };

    if !sd.is_extension() {
        return;
    }

    enforce_extension_context(&sd, parent_path, location, issues);

    let Some(snapshot) = sd.snapshot.as_ref() else {
        return;
    };
    let index = ElementIndex::new(&snapshot.element);
    validate_object(ext, "Extension", &index, plan, context, issues);
}

/// Checks an extension's `context` entries of type `element` against the
/// path it was found at. `fhirpath`/`extension` context types aren't
/// evaluated structurally; their presence is noted with an informational
/// issue rather than enforced.
fn enforce_extension_context(
    sd: &meridian_models::StructureDefinition,
    parent_path: &str,
    location: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(contexts) = sd.context.as_ref() else {
        return;
    };

    let element_contexts: Vec<&str> = contexts
        .iter()
        .filter(|c| c.context_type == "element")
        .map(|c| c.expression.as_str())
        .collect();

    if element_contexts.is_empty() {
        if contexts
            .iter()
            .any(|c| c.context_type == "fhirpath" || c.context_type == "extension")
        {
            issues.push(
                ValidationIssue::information(
                    IssueCode::Informational,
                    format!(
                        "extension '{}' declares only fhirpath/extension context types, which are not structurally enforced",
                        sd.url
                    ),
                )
                .with_location(location.to_string()),
            );
        }
        return;
    }

    let root_type = parent_path.split('.').next().unwrap_or(parent_path);
    let matches = element_contexts.iter().any(|expr| {
        *expr == "*" || *expr == parent_path || *expr == root_type || parent_path.ends_with(&format!(".{}", expr))
    });

    if !matches {
        issues.push(
            ValidationIssue::warning(
                IssueCode::Extension,
                format!(
                    "extension '{}' is not permitted at '{}' (allowed contexts: {})",
                    sd.url,
                    parent_path,
                    element_contexts.join(", ")
                ),
            )
            .with_location(location.to_string()),
        );
    }
}

/// Cardinality per §4.5, aggregating choice-type suffixes into the base
/// element, plus the "exactly one choice suffix present" structural rule.
fn validate_cardinality_and_choice_exclusivity(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    index: &ElementIndex<'_>,
    issues: &mut Vec<ValidationIssue>,
) {
    for child_def in index.children_of(path) {
        let Some(name) = child_def.path.rsplit('.').next() else {
            continue;
        };

        if name.ends_with("[x]") {
            let base_name = name.trim_end_matches("[x]");
            let present: Vec<&String> = obj
                .keys()
                .filter(|k| {
                    k.starts_with(base_name)
                        && k.len() > base_name.len()
                        && k.as_bytes()[base_name.len()].is_ascii_uppercase()
                })
                .collect();

            if present.len() > 1 {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Structure,
                        format!(
                            "Choice element '{}[x]' has multiple variants present: {}",
                            base_name,
                            present.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    )
                    .with_location(format!("{}.{}[x]", path, base_name)),
                );
            }

            let count = present.len() as u64;
            check_min_max(count, &format!("{}[x]", base_name), &format!("{}.{}[x]", path, base_name), child_def, issues);
            continue;
        }

        let child_path = format!("{}.{}", path, name);
        let count = match obj.get(name) {
            Some(Value::Array(arr)) => arr.len() as u64,
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        };
        check_min_max(count, name, &child_path, child_def, issues);
    }
}

fn check_min_max(
    count: u64,
    name: &str,
    path: &str,
    def: &meridian_models::ElementDefinition,
    issues: &mut Vec<ValidationIssue>,
) {
    let min = def.min.unwrap_or(0) as u64;
    let max = def.max.as_deref().unwrap_or("*");

    if count < min {
        issues.push(
            ValidationIssue::error(
                IssueCode::Required,
                format!("Element '{}' has minimum cardinality {} but found {}", name, min, count),
            )
            .with_location(path.to_string())
            .with_expression(vec![path.to_string()]),
        );
    }

    if max != "*" {
        if let Ok(max_num) = max.parse::<u64>() {
            if count > max_num {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Value,
                        format!("Element '{}' has maximum cardinality {} but found {}", name, max_num, count),
                    )
                    .with_location(path.to_string())
                    .with_expression(vec![path.to_string()]),
                );
            }
        }
    }
}

/// JSON-kind check then regex, per §4.6. Stops after a kind mismatch - no
/// regex is applied to a value of the wrong JSON type.
fn validate_primitive<C: FhirContext>(
    value: &Value,
    type_code: &str,
    path: &str,
    context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    let (kind_ok, expected_kind) = match type_code {
        "boolean" => (value.is_boolean(), "boolean"),
        "integer" | "unsignedInt" | "positiveInt" => (value.is_i64() || value.is_u64(), "integer"),
        "decimal" => (value.is_number(), "number"),
        _ => (value.is_string(), "string"),
    };

    if !kind_ok {
        issues.push(
            ValidationIssue::error(
                IssueCode::Invalid,
                format!("value must be a {}", expected_kind),
            )
            .with_location(path.to_string())
            .with_expression(vec![path.to_string()]),
        );
        return;
    }

    match type_code {
        "positiveInt" => {
            if value.as_i64().unwrap_or(0) <= 0 {
                issues.push(
                    ValidationIssue::error(IssueCode::Invalid, "positiveInt must be > 0".to_string())
                        .with_location(path.to_string())
                        .with_expression(vec![path.to_string()]),
                );
            }
            return;
        }
        "unsignedInt" => {
            if value.as_i64().unwrap_or(-1) < 0 {
                issues.push(
                    ValidationIssue::error(IssueCode::Invalid, "unsignedInt must be >= 0".to_string())
                        .with_location(path.to_string())
                        .with_expression(vec![path.to_string()]),
                );
            }
            return;
        }
        "boolean" | "integer" | "decimal" => return,
        _ => {}
    }

    let Some(s) = value.as_str() else {
        return;
    };

    if let Some(re) = regex_for_primitive(context, type_code) {
        if !re.is_match(s) {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Invalid,
                    format!("Not a valid {} format: '{}'", type_code, s),
                )
                .with_location(path.to_string())
                .with_expression(vec![path.to_string()]),
            );
        }
    }
}

const REGEX_EXTENSION_URL: &str = "http://hl7.org/fhir/StructureDefinition/regex";

fn regex_cache() -> &'static Mutex<HashMap<String, Arc<Regex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Looks up the `regex` extension on `<T>.value` in `T`'s own
/// `StructureDefinition`, compiling and caching it by type code.
fn regex_for_primitive<C: FhirContext>(context: &C, type_code: &str) -> Option<Arc<Regex>> {
    if let Some(hit) = regex_cache().lock().unwrap().get(type_code) {
        return Some(Arc::clone(hit));
    }

    let sd = context.structure_definition_for_type(type_code).ok()??;
    let value_path = format!("{}.value", type_code);
    let pattern = sd
        .snapshot
        .as_ref()?
        .element
        .iter()
        .find(|e| e.path == value_path)
        .and_then(|e| e.extensions.get("extension"))
        .and_then(Value::as_array)
        .and_then(|exts| {
            exts.iter().find_map(|ext| {
                let url = ext.get("url").and_then(Value::as_str)?;
                if url != REGEX_EXTENSION_URL {
                    return None;
                }
                ext.get("valueString").and_then(Value::as_str)
            })
        })?;

    let compiled = Regex::new(pattern).ok()?;
    let compiled = Arc::new(compiled);
    regex_cache()
        .lock()
        .unwrap()
        .insert(type_code.to_string(), Arc::clone(&compiled));
    Some(compiled)
}

fn get_resource_type(resource: &Value) -> Option<String> {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::IssueSeverity;
    use meridian_context::DefaultFhirContext;
    use serde_json::json;

    fn patient_sd() -> Value {
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
                    {"path": "Patient", "min": 0, "max": "1"},
                    {"path": "Patient.active", "min": 0, "max": "1", "type": [{"code": "boolean"}]},
                    {"path": "Patient.gender", "min": 0, "max": "1", "type": [{"code": "code"}]},
                ]
            }
        })
    }

    fn boolean_sd() -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/boolean",
            "name": "boolean",
            "status": "active",
            "kind": "primitive-type",
            "abstract": false,
            "type": "boolean"
        })
    }

    #[test]
    fn flags_unknown_element() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(boolean_sd()).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(&json!({"resourceType": "Patient", "foo": "bar"}), &plan, &ctx, &mut issues);

        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Structure && i.diagnostics.contains("Unknown element 'foo'")));
    }

    #[test]
    fn flags_wrong_json_kind_for_primitive() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(boolean_sd()).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(&json!({"resourceType": "Patient", "active": "true"}), &plan, &ctx, &mut issues);

        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Invalid && i.diagnostics.contains("must be a boolean")));
    }

    #[test]
    fn unknown_resource_type_is_reported() {
        let ctx = DefaultFhirContext::new();
        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(&json!({"resourceType": "Frob"}), &plan, &ctx, &mut issues);
        assert!(issues.iter().any(|i| i.diagnostics.contains("Unknown resourceType")));
    }

    fn birthplace_extension_sd(context_expression: &str) -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/patient-birthPlace",
            "name": "birthPlace",
            "status": "active",
            "kind": "complex-type",
            "abstract": false,
            "type": "Extension",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Extension",
            "context": [{"type": "element", "expression": context_expression}],
            "snapshot": {
                "element": [
                    {"path": "Extension", "min": 0, "max": "1"},
                    {"path": "Extension.url", "min": 1, "max": "1", "type": [{"code": "uri"}]},
                    {"path": "Extension.valueAddress", "min": 0, "max": "1", "type": [{"code": "Address"}]},
                ]
            }
        })
    }

    #[test]
    fn extension_used_in_declared_context_is_accepted() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(boolean_sd()).unwrap();
        ctx.register(birthplace_extension_sd("Patient")).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(
            &json!({
                "resourceType": "Patient",
                "extension": [{
                    "url": "http://hl7.org/fhir/StructureDefinition/patient-birthPlace",
                    "valueAddress": {"city": "Springfield"}
                }]
            }),
            &plan,
            &ctx,
            &mut issues,
        );

        assert!(!issues.iter().any(|i| i.code == IssueCode::Extension));
    }

    #[test]
    fn extension_used_outside_declared_context_is_flagged() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(boolean_sd()).unwrap();
        ctx.register(birthplace_extension_sd("Observation")).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(
            &json!({
                "resourceType": "Patient",
                "extension": [{
                    "url": "http://hl7.org/fhir/StructureDefinition/patient-birthPlace",
                    "valueAddress": {"city": "Springfield"}
                }]
            }),
            &plan,
            &ctx,
            &mut issues,
        );

        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Extension && i.diagnostics.contains("not permitted")));
    }

    #[test]
    fn extension_with_only_fhirpath_context_is_informational_not_enforced() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(boolean_sd()).unwrap();

        let mut fhirpath_only_ext = birthplace_extension_sd("Patient");
        fhirpath_only_ext["context"] = json!([
            {"type": "fhirpath", "expression": "Patient.name.exists()"}
        ]);
        ctx.register(fhirpath_only_ext).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(
            &json!({
                "resourceType": "Patient",
                "extension": [{
                    "url": "http://hl7.org/fhir/StructureDefinition/patient-birthPlace",
                    "valueAddress": {"city": "Springfield"}
                }]
            }),
            &plan,
            &ctx,
            &mut issues,
        );

        assert!(!issues.iter().any(|i| i.code == IssueCode::Extension));
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Informational && i.severity == IssueSeverity::Information));
    }

    #[test]
    fn over_max_cardinality_is_a_value_error() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(boolean_sd()).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(
            &json!({"resourceType": "Patient", "active": [true, false]}),
            &plan,
            &ctx,
            &mut issues,
        );

        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Value && i.diagnostics.contains("maximum cardinality")));
    }

    #[test]
    fn unresolved_extension_url_is_a_warning() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(
            &json!({
                "resourceType": "Patient",
                "extension": [{"url": "http://example.org/unregistered-extension", "valueString": "x"}]
            }),
            &plan,
            &ctx,
            &mut issues,
        );

        assert!(issues.iter().any(|i| {
            i.code == IssueCode::Extension
                && i.severity == IssueSeverity::Warning
                && i.diagnostics.contains("Unknown extension")
        }));
    }

    #[test]
    fn unresolved_modifier_extension_url_is_an_error() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();

        let mut issues = Vec::new();
        let plan = SchemaPlan {
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        };
        validate_schema(
            &json!({
                "resourceType": "Patient",
                "modifierExtension": [{"url": "http://example.org/unregistered-modifier", "valueString": "x"}]
            }),
            &plan,
            &ctx,
            &mut issues,
        );

        assert!(issues.iter().any(|i| {
            i.code == IssueCode::Extension
                && i.severity == IssueSeverity::Error
                && i.diagnostics.contains("Unknown extension")
        }));
    }
}
