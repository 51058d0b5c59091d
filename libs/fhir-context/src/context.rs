//! The conformance registry: indexed lookup of `StructureDefinition`,
//! `ValueSet`, and `CodeSystem` resources by canonical URL and by type name.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use meridian_models::common::code_system::CodeSystem;
use meridian_models::common::value_set::ValueSet;
use meridian_models::{StructureDefinition, StructureDefinitionKind};
use serde_json::Value;

use crate::error::{Error, Result};

const CORE_BASE: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Read access to the set of conformance resources (`StructureDefinition`,
/// `ValueSet`, `CodeSystem`, ...) available while validating a resource.
///
/// Implementors only need to provide raw JSON lookup by canonical URL;
/// typed accessors and the classification predicates below are derived from
/// it so every context — in-memory, cached, or composed — gets them for free.
pub trait FhirContext: Send + Sync {
    /// Fetch the raw JSON for a canonical URL, optionally pinned to a
    /// specific business version (`StructureDefinition.version`).
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>>;

    /// Fetch the latest known version of a resource by canonical URL.
    fn get_latest_resource_by_url(&self, canonical_url: &str) -> Result<Option<Arc<Value>>> {
        self.get_resource_by_url(canonical_url, None)
    }

    /// Fetch and parse a `StructureDefinition` by canonical URL.
    fn get_structure_definition(
        &self,
        canonical_url: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        match self.get_latest_resource_by_url(canonical_url)? {
            Some(value) => {
                let sd: StructureDefinition = serde_json::from_value((*value).clone())?;
                Ok(Some(Arc::new(sd)))
            }
            None => Ok(None),
        }
    }

    /// Fetch and parse a `ValueSet` by canonical URL, used by the binding
    /// phase to expand a binding's allowed codes.
    fn get_value_set(&self, canonical_url: &str) -> Result<Option<Arc<ValueSet>>> {
        match self.get_latest_resource_by_url(canonical_url)? {
            Some(value) => {
                let vs: ValueSet = serde_json::from_value((*value).clone())?;
                Ok(Some(Arc::new(vs)))
            }
            None => Ok(None),
        }
    }

    /// Fetch and parse a `CodeSystem` by canonical URL, used to resolve a
    /// value set's `compose.include` entries and walk `is-a` hierarchies.
    fn get_code_system(&self, canonical_url: &str) -> Result<Option<Arc<CodeSystem>>> {
        match self.get_latest_resource_by_url(canonical_url)? {
            Some(value) => {
                let cs: CodeSystem = serde_json::from_value((*value).clone())?;
                Ok(Some(Arc::new(cs)))
            }
            None => Ok(None),
        }
    }

    /// Resolve a bare type name (e.g. `"HumanName"`, `"Patient"`) to its core
    /// `StructureDefinition`, preferring the HL7 core canonical URL.
    fn structure_definition_for_type(
        &self,
        type_name: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        self.get_structure_definition(&format!("{CORE_BASE}{type_name}"))
    }

    /// True if `type_name` names a FHIR resource (kind == resource).
    fn is_resource_type(&self, type_name: &str) -> bool {
        self.structure_definition_for_type(type_name)
            .ok()
            .flatten()
            .map(|sd| sd.kind == StructureDefinitionKind::Resource)
            .unwrap_or(false)
    }

    /// True if `type_name` names a resource derived (directly or indirectly)
    /// from `DomainResource`.
    fn is_domain_resource(&self, type_name: &str) -> bool {
        if type_name == "DomainResource" {
            return true;
        }
        let mut current = type_name.to_string();
        let mut hops = 0;
        while hops < 16 {
            let Some(sd) = self
                .structure_definition_for_type(&current)
                .ok()
                .flatten()
            else {
                return false;
            };
            let Some(base) = sd.get_base_type_name() else {
                return false;
            };
            if base == "DomainResource" {
                return true;
            }
            if base == "Resource" {
                return false;
            }
            current = base;
            hops += 1;
        }
        false
    }

    /// True if `type_name` names a FHIR primitive type (kind == primitive-type).
    fn is_primitive_type(&self, type_name: &str) -> bool {
        self.structure_definition_for_type(type_name)
            .ok()
            .flatten()
            .map(|sd| sd.kind == StructureDefinitionKind::PrimitiveType)
            .unwrap_or(false)
    }
}

/// An in-memory conformance registry. Resources are ingested up front (there
/// is no package fetching or HTTP resolution here) and looked up by
/// canonical URL.
const PARSED_CACHE_SIZE: usize = 512;

pub struct DefaultFhirContext {
    by_url: RwLock<HashMap<String, Arc<Value>>>,
    parsed: Mutex<LruCache<String, Arc<StructureDefinition>>>,
}

impl Default for DefaultFhirContext {
    fn default() -> Self {
        Self {
            by_url: RwLock::new(HashMap::new()),
            parsed: Mutex::new(LruCache::new(NonZeroUsize::new(PARSED_CACHE_SIZE).unwrap())),
        }
    }
}

impl DefaultFhirContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single conformance resource. Requires a `url` field.
    #[tracing::instrument(skip(self, resource))]
    pub fn register(&self, resource: Value) -> Result<()> {
        let url = resource
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::InvalidStructureDefinition(
                    "conformance resource is missing a 'url' field".to_string(),
                )
            })?
            .to_string();
        self.by_url.write().unwrap().insert(url, Arc::new(resource));
        Ok(())
    }

    /// Register every resource in `resources`, failing on the first one
    /// missing a `url` field.
    pub fn register_all(&self, resources: impl IntoIterator<Item = Value>) -> Result<()> {
        for resource in resources {
            self.register(resource)?;
        }
        Ok(())
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Value>) -> Result<Self> {
        let ctx = Self::new();
        ctx.register_all(resources)?;
        Ok(ctx)
    }

    pub fn len(&self) -> usize {
        self.by_url.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FhirContext for DefaultFhirContext {
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>> {
        let store = self.by_url.read().unwrap();
        let Some(resource) = store.get(canonical_url) else {
            return Ok(None);
        };
        if let Some(version) = version {
            let matches = resource
                .get("version")
                .and_then(Value::as_str)
                .map(|v| v == version)
                .unwrap_or(false);
            if !matches {
                return Ok(None);
            }
        }
        Ok(Some(Arc::clone(resource)))
    }

    /// Parses and caches `StructureDefinition`s by canonical URL so repeated
    /// classification checks (`isPrimitiveType`, `isDomainResource`, ...)
    /// against the same profile don't re-deserialize its JSON each time.
    fn get_structure_definition(
        &self,
        canonical_url: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        if let Some(hit) = self.parsed.lock().unwrap().get(canonical_url) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(value) = self.get_latest_resource_by_url(canonical_url)? else {
            return Ok(None);
        };
        let sd: StructureDefinition = serde_json::from_value((*value).clone())?;
        let sd = Arc::new(sd);
        self.parsed
            .lock()
            .unwrap()
            .put(canonical_url.to_string(), Arc::clone(&sd));
        Ok(Some(sd))
    }
}

impl FhirContext for &DefaultFhirContext {
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>> {
        (**self).get_resource_by_url(canonical_url, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/DomainResource"
        })
    }

    fn string_sd() -> Value {
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
    fn registers_and_looks_up_by_url() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();

        let sd = ctx
            .get_structure_definition("http://hl7.org/fhir/StructureDefinition/Patient")
            .unwrap()
            .unwrap();
        assert_eq!(sd.name, "Patient");
    }

    #[test]
    fn classifies_resource_and_primitive_types() {
        let ctx = DefaultFhirContext::new();
        ctx.register(patient_sd()).unwrap();
        ctx.register(string_sd()).unwrap();

        assert!(ctx.is_resource_type("Patient"));
        assert!(ctx.is_domain_resource("Patient"));
        assert!(ctx.is_primitive_type("string"));
        assert!(!ctx.is_primitive_type("Patient"));
    }

    #[test]
    fn missing_resource_returns_none() {
        let ctx = DefaultFhirContext::new();
        assert!(ctx
            .get_structure_definition("http://hl7.org/fhir/StructureDefinition/Missing")
            .unwrap()
            .is_none());
    }
}
