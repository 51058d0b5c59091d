use crate::expansion::expand_snapshot;
use meridian_context::{Error, FhirContext, Result};
use meridian_models::StructureDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug)]
struct SdCacheKey {
    url: String,
    version: Option<String>,
}

impl PartialEq for SdCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.version == other.version
    }
}

impl Eq for SdCacheKey {}

impl Hash for SdCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.version.hash(state);
    }
}

/// A [`FhirContext`] wrapper that guarantees `StructureDefinition.snapshot`
/// is deep-expanded: every complex-type element's own nested elements are
/// spliced in under its path, so phases that walk the snapshot don't need to
/// resolve nested types themselves.
///
/// Generating a snapshot from a differential is out of scope; every resource
/// served by the inner context is expected to already carry a `snapshot`.
///
/// While this type is defined in `fhir-snapshot`, it semantically belongs to
/// the context layer and implements [`FhirContext`]. It's kept here to avoid
/// a circular dependency (it needs `expand_snapshot` from this crate).
pub struct ExpandedFhirContext<C: FhirContext> {
    inner: C,
    expanded: RwLock<HashMap<SdCacheKey, Arc<StructureDefinition>>>,
}

impl<C: FhirContext> ExpandedFhirContext<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            expanded: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn key_for(url: &str, sd: &StructureDefinition) -> SdCacheKey {
        SdCacheKey {
            url: url.to_string(),
            version: sd.version.clone(),
        }
    }

    fn get_or_build_expanded(
        &self,
        canonical_url: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        let Some(resource) = self.inner.get_latest_resource_by_url(canonical_url)? else {
            return Ok(None);
        };
        let raw_sd: StructureDefinition = serde_json::from_value((*resource).clone())?;

        let key = Self::key_for(canonical_url, &raw_sd);
        if let Some(hit) = self.expanded.read().ok().and_then(|m| m.get(&key).cloned()) {
            return Ok(Some(hit));
        }

        let snapshot = raw_sd.snapshot.as_ref().ok_or_else(|| {
            Error::InvalidStructureDefinition(format!(
                "StructureDefinition {} has no snapshot",
                canonical_url
            ))
        })?;

        let deep = expand_snapshot(snapshot, self).map_err(|e| {
            Error::InvalidStructureDefinition(format!(
                "Failed to deep-expand snapshot for {}: {}",
                canonical_url, e
            ))
        })?;

        let mut expanded_sd = raw_sd;
        expanded_sd.snapshot = Some(deep);

        let expanded_sd = Arc::new(expanded_sd);
        if let Ok(mut m) = self.expanded.write() {
            m.insert(key, Arc::clone(&expanded_sd));
        }

        Ok(Some(expanded_sd))
    }
}

impl<C: FhirContext> FhirContext for ExpandedFhirContext<C> {
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>> {
        self.inner.get_resource_by_url(canonical_url, version)
    }

    fn get_structure_definition(
        &self,
        canonical_url: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        self.get_or_build_expanded(canonical_url)
    }
}

/// Wraps a borrowed `&dyn FhirContext` so it can be used with [`ExpandedFhirContext`].
pub struct BorrowedFhirContext<'a>(pub &'a dyn FhirContext);

impl FhirContext for BorrowedFhirContext<'_> {
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>> {
        self.0.get_resource_by_url(canonical_url, version)
    }
}

impl<'a> ExpandedFhirContext<BorrowedFhirContext<'a>> {
    pub fn borrowed(inner: &'a dyn FhirContext) -> Self {
        Self::new(BorrowedFhirContext(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MockContext {
        by_url: HashMap<String, Arc<Value>>,
    }

    impl FhirContext for MockContext {
        fn get_resource_by_url(
            &self,
            canonical_url: &str,
            _version: Option<&str>,
        ) -> Result<Option<Arc<Value>>> {
            Ok(self.by_url.get(canonical_url).cloned())
        }
    }

    fn sd_human_name() -> Value {
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
                    { "id": "HumanName.given", "path": "HumanName.given", "min": 0, "max": "*", "type": [{ "code": "string" }] }
                ]
            }
        })
    }

    fn sd_patient() -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/Patient",
            "name": "Patient",
            "status": "active",
            "kind": "resource",
            "abstract": false,
            "type": "Patient",
            "snapshot": {
                "element": [
                    { "id": "Patient", "path": "Patient" },
                    { "id": "Patient.name", "path": "Patient.name", "min": 0, "max": "*", "type": [{ "code": "HumanName" }] }
                ]
            }
        })
    }

    #[test]
    fn deep_expands_nested_complex_types() {
        let mut by_url = HashMap::new();
        by_url.insert(
            "http://hl7.org/fhir/StructureDefinition/HumanName".to_string(),
            Arc::new(sd_human_name()),
        );
        by_url.insert(
            "http://hl7.org/fhir/StructureDefinition/Patient".to_string(),
            Arc::new(sd_patient()),
        );

        let expanded = ExpandedFhirContext::new(MockContext { by_url });
        let sd = expanded
            .get_structure_definition("http://hl7.org/fhir/StructureDefinition/Patient")
            .unwrap()
            .unwrap();

        let snapshot = sd.snapshot.as_ref().unwrap();
        assert!(snapshot
            .element
            .iter()
            .any(|e| e.path == "Patient.name.given"));
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let mut by_url = HashMap::new();
        by_url.insert(
            "http://example.org/fhir/StructureDefinition/NoSnapshot".to_string(),
            Arc::new(json!({
                "resourceType": "StructureDefinition",
                "url": "http://example.org/fhir/StructureDefinition/NoSnapshot",
                "name": "NoSnapshot",
                "status": "active",
                "kind": "resource",
                "abstract": false,
                "type": "Patient"
            })),
        );

        let expanded = ExpandedFhirContext::new(MockContext { by_url });
        let result =
            expanded.get_structure_definition("http://example.org/fhir/StructureDefinition/NoSnapshot");
        assert!(result.is_err());
    }
}
