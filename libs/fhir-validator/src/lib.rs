//! Configurable, pipelined FHIR resource validation.
//!
//! A [`ValidatorConfig`] (built directly, via [`Preset`], or parsed from
//! YAML) compiles into a [`ValidationPlan`] naming which phases run; a
//! [`Validator`] executes that plan against a [`meridian_context::FhirContext`]
//! once and validates any number of resources.

pub mod config;
pub mod error;
pub mod plan;
pub mod steps;
pub mod validator;

pub use config::{
    BestPracticeMode, BundleConfig, CachePolicy, ConstraintId, ConstraintLevelOverride,
    ConstraintsConfig, ConstraintsMode, ExecConfig, ExtensibleHandling, FhirConfig, FhirVersion,
    Preset, ProfilesConfig, ProfilesMode, ReferenceMode, ReferencesConfig, SchemaConfig,
    SchemaMode, TerminologyConfig, TerminologyMode, TimeoutPolicy, ValidatorConfig,
    ValidatorConfigBuilder,
};
pub use error::ConfigError;
pub use plan::{
    BundlePlan, ConstraintsPlan, ProfilesPlan, ReferencesPlan, SchemaPlan, Step, TerminologyPlan,
    ValidationPlan,
};
pub use validator::{IssueCode, IssueSeverity, ValidationIssue, ValidationOutcome, Validator};
