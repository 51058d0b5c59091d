//! Conformance registry for FHIR validation
//!
//! Indexes `StructureDefinition`, `ValueSet`, and `CodeSystem` resources by
//! canonical URL and exposes the classification predicates (`isResourceType`,
//! `isDomainResource`, `isPrimitiveType`) the validator's phases need.
//!
//! Resources are ingested up front by the caller; this crate performs no
//! package fetching, tarball extraction, or HTTP resolution.

pub mod context;
pub mod error;

pub use context::{DefaultFhirContext, FhirContext};
pub use error::{Error, Result};
