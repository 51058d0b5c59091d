//! Bundle-specific checks: `fullUrl` consistency with `entry.resource.id`,
//! duplicate `fullUrl`s, and per-`Bundle.type` entry shape rules (first entry
//! of a document/message, request/response presence for transaction-style
//! bundles).
//!
//! Other phases validate the Bundle resource itself (and, recursively, each
//! entry's resource) structurally; this module only covers rules that live
//! *between* entries.

use std::collections::HashMap;

use meridian_context::FhirContext;
use serde_json::Value;

use crate::validator::{IssueCode, ValidationIssue};
use crate::BundlePlan;

pub fn validate_bundles<C: FhirContext>(
    resource: &Value,
    plan: &BundlePlan,
    _context: &C,
    issues: &mut Vec<ValidationIssue>,
) {
    if resource.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return;
    }

    let Some(entries) = resource.get("entry").and_then(Value::as_array) else {
        return;
    };

    let bundle_type = resource.get("type").and_then(Value::as_str);

    if plan.check_fullurl_consistency {
        check_fullurl_consistency(entries, issues);
    }

    check_duplicate_fullurls(entries, issues);

    if let Some(bundle_type) = bundle_type {
        check_type_specific_rules(bundle_type, entries, issues);
    }
}

fn check_fullurl_consistency(entries: &[Value], issues: &mut Vec<ValidationIssue>) {
    for (i, entry) in entries.iter().enumerate() {
        let location = format!("Bundle.entry[{}]", i);

        let Some(full_url) = entry.get("fullUrl").and_then(Value::as_str) else {
            continue;
        };
        let Some(entry_resource) = entry.get("resource") else {
            continue;
        };
        let Some(resource_type) = entry_resource.get("resourceType").and_then(Value::as_str) else {
            continue;
        };
        let Some(id) = entry_resource.get("id").and_then(Value::as_str) else {
            continue;
        };

        if full_url.starts_with("urn:uuid:") || full_url.starts_with("urn:oid:") {
            continue;
        }

        let expected_suffix = format!("{}/{}", resource_type, id);
        if !full_url.ends_with(&expected_suffix) {
            issues.push(
                ValidationIssue::error(
                    IssueCode::BusinessRule,
                    format!(
                        "entry.fullUrl '{}' does not match entry.resource '{}'",
                        full_url, expected_suffix
                    ),
                )
                .with_location(location),
            );
        }
    }
}

fn check_duplicate_fullurls(entries: &[Value], issues: &mut Vec<ValidationIssue>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        let Some(full_url) = entry.get("fullUrl").and_then(Value::as_str) else {
            continue;
        };
        if let Some(first_index) = seen.get(full_url) {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Duplicate,
                    format!(
                        "entry.fullUrl '{}' is duplicated (first seen at entry[{}])",
                        full_url, first_index
                    ),
                )
                .with_location(format!("Bundle.entry[{}]", i)),
            );
        } else {
            seen.insert(full_url, i);
        }
    }
}

fn check_type_specific_rules(bundle_type: &str, entries: &[Value], issues: &mut Vec<ValidationIssue>) {
    match bundle_type {
        "document" => {
            if let Some(first) = entries.first() {
                let rtype = first
                    .get("resource")
                    .and_then(|r| r.get("resourceType"))
                    .and_then(Value::as_str);
                if rtype != Some("Composition") {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::BusinessRule,
                            "a document Bundle's first entry must be a Composition".to_string(),
                        )
                        .with_location("Bundle.entry[0]".to_string()),
                    );
                }
            }
        }
        "message" => {
            if let Some(first) = entries.first() {
                let rtype = first
                    .get("resource")
                    .and_then(|r| r.get("resourceType"))
                    .and_then(Value::as_str);
                if rtype != Some("MessageHeader") {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::BusinessRule,
                            "a message Bundle's first entry must be a MessageHeader".to_string(),
                        )
                        .with_location("Bundle.entry[0]".to_string()),
                    );
                }
            }
        }
        "transaction" | "batch" => {
            for (i, entry) in entries.iter().enumerate() {
                if entry.get("request").and_then(|r| r.get("method")).is_none() {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::Required,
                            format!(
                                "entries in a {} Bundle require entry.request.method",
                                bundle_type
                            ),
                        )
                        .with_location(format!("Bundle.entry[{}]", i)),
                    );
                }
            }
        }
        "history" => {
            for (i, entry) in entries.iter().enumerate() {
                let has_request = entry.get("request").is_some();
                let has_response = entry.get("response").is_some();
                if !has_request && !has_response {
                    issues.push(
                        ValidationIssue::warning(
                            IssueCode::BusinessRule,
                            "history Bundle entries are expected to carry request and/or response"
                                .to_string(),
                        )
                        .with_location(format!("Bundle.entry[{}]", i)),
                    );
                }
            }
        }
        "searchset" => {
            for (i, entry) in entries.iter().enumerate() {
                if entry.get("search").and_then(|s| s.get("mode")).is_none() {
                    issues.push(
                        ValidationIssue::information(
                            IssueCode::Informational,
                            "searchset Bundle entry has no entry.search.mode".to_string(),
                        )
                        .with_location(format!("Bundle.entry[{}]", i)),
                    );
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_context::DefaultFhirContext;
    use serde_json::json;

    fn plan(check_fullurl: bool) -> BundlePlan {
        BundlePlan {
            check_fullurl_consistency: check_fullurl,
        }
    }

    #[test]
    fn non_bundle_resources_are_ignored() {
        let ctx = DefaultFhirContext::new();
        let mut issues = Vec::new();
        validate_bundles(&json!({"resourceType": "Patient"}), &plan(true), &ctx, &mut issues);
        assert!(issues.is_empty());
    }

    #[test]
    fn flags_fullurl_mismatch() {
        let ctx = DefaultFhirContext::new();
        let mut issues = Vec::new();
        validate_bundles(
            &json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": [{
                    "fullUrl": "http://example.org/fhir/Patient/1",
                    "resource": {"resourceType": "Patient", "id": "2"}
                }]
            }),
            &plan(true),
            &ctx,
            &mut issues,
        );
        assert!(issues.iter().any(|i| i.code == IssueCode::BusinessRule));
    }

    #[test]
    fn flags_duplicate_fullurls() {
        let ctx = DefaultFhirContext::new();
        let mut issues = Vec::new();
        validate_bundles(
            &json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": [
                    {"fullUrl": "urn:uuid:1", "resource": {"resourceType": "Patient", "id": "1"}},
                    {"fullUrl": "urn:uuid:1", "resource": {"resourceType": "Patient", "id": "1"}}
                ]
            }),
            &plan(true),
            &ctx,
            &mut issues,
        );
        assert!(issues.iter().any(|i| i.code == IssueCode::Duplicate));
    }

    #[test]
    fn document_bundle_requires_composition_first() {
        let ctx = DefaultFhirContext::new();
        let mut issues = Vec::new();
        validate_bundles(
            &json!({
                "resourceType": "Bundle",
                "type": "document",
                "entry": [{"resource": {"resourceType": "Patient", "id": "1"}}]
            }),
            &plan(false),
            &ctx,
            &mut issues,
        );
        assert!(issues
            .iter()
            .any(|i| i.diagnostics.contains("must be a Composition")));
    }

    #[test]
    fn transaction_bundle_requires_request_method() {
        let ctx = DefaultFhirContext::new();
        let mut issues = Vec::new();
        validate_bundles(
            &json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [{"resource": {"resourceType": "Patient", "id": "1"}}]
            }),
            &plan(false),
            &ctx,
            &mut issues,
        );
        assert!(issues.iter().any(|i| i.code == IssueCode::Required));
    }
}
