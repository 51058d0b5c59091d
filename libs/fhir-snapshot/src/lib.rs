//! Per-profile element index and snapshot bookkeeping for FHIR validation
//!
//! `StructureDefinition` ingestion is the conformance registry's job
//! ([`meridian_context`]); this crate sits just above it and gives the
//! validator's phases the two things they need to stop re-scanning a flat
//! `snapshot.element` array on every resource:
//!
//! - [`element_index::ElementIndex`] — `byPath` / `choiceTypes` /
//!   `childrenOf` / `slicingAt` lookups over a single already-snapshotted
//!   `StructureDefinition`, built once and reused across every instance
//!   validated against that profile.
//! - [`ExpandedFhirContext`] — a [`meridian_context::FhirContext`] decorator
//!   that deep-expands a snapshot on first use (splicing a complex-type
//!   element's own children in under its path) and caches the result.
//!
//! Differential-to-snapshot *generation* is out of scope: every
//! `StructureDefinition` consumed here is expected to already carry a
//! `snapshot`, matching the validation engine's own lifecycle assumptions.
//! `normalization` and `validation` only normalize/sanity-check the
//! snapshot shape the registry already ingested.
//!
//! # Example
//!
//! ```rust,no_run
//! use meridian_snapshot::{ElementIndex, ExpandedFhirContext};
//! use meridian_context::DefaultFhirContext;
//!
//! let ctx = DefaultFhirContext::new();
//! let expanded = ExpandedFhirContext::new(ctx);
//! ```

pub mod element_index;
pub mod error;
pub mod expanded_context;
pub mod expansion;
pub mod normalization;
pub mod validation;

pub use element_index::{ChoiceBase, ElementIndex};
pub use error::{Error, Result};
pub use expanded_context::{BorrowedFhirContext, ExpandedFhirContext};
pub use expansion::expand_snapshot;
pub use normalization::{
    extract_slice_name_from_id, normalize_differential, normalize_snapshot,
    validate_id_slice_consistency,
};
pub use validation::{validate_differential, validate_snapshot};

pub use meridian_models::{Differential, ElementDefinition, ElementDefinitionType, Snapshot};
