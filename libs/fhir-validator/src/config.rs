//! Declarative validator configuration
//!
//! `ValidatorConfig` is the only thing callers build by hand: a preset
//! shortcut, a builder, or a YAML document. `compile()` turns it into a
//! `ValidationPlan` (see [`crate::plan`]) once; the plan, not the config, is
//! what the pipeline driver consults per validated resource.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::plan::{
    BundlePlan, ConstraintsPlan, ProfilesPlan, ReferencesPlan, SchemaPlan, Step, TerminologyPlan,
    ValidationPlan,
};
use crate::validator::IssueSeverity;

/// FHIR release targeted by a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FhirVersion {
    R4,
    R4B,
    R5,
}

impl Default for FhirVersion {
    fn default() -> Self {
        Self::R4
    }
}

/// Named bundles of defaults, mirroring the common deployment shapes:
/// ingest-time rejection, always-on server-side checking, and the
/// everything-enabled mode used when authoring/publishing profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// Fast structural/cardinality rejection at the data-entry boundary.
    /// No terminology or reference resolution (both need a populated
    /// registry callers may not have warmed up yet).
    Ingestion,
    /// The steady-state shape for a FHIR server: full schema and profile
    /// conformance plus local terminology and reference checking.
    Server,
    /// Everything on, including best-practice constraints as warnings.
    /// Used by implementation guide authors validating example resources.
    Authoring,
    /// Like `Authoring`, but best-practice constraints are promoted to
    /// errors — the shape used right before publishing a guide.
    Publication,
}

macro_rules! mode_enum {
    ($name:ident { $($variant:ident),+ $(,)? }, default = $default:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }
    };
}

mode_enum!(SchemaMode { On, Off }, default = On);
mode_enum!(ProfilesMode { On, Off }, default = On);
mode_enum!(ConstraintsMode { Off, Full }, default = Off);
mode_enum!(BestPracticeMode { Ignore, Warn, Error }, default = Warn);
mode_enum!(TerminologyMode { Off, Local, Remote }, default = Off);
mode_enum!(ExtensibleHandling { Warn, Error }, default = Warn);
mode_enum!(TimeoutPolicy { Error, Warn, Ignore }, default = Warn);
mode_enum!(CachePolicy { Enabled, Disabled }, default = Enabled);
mode_enum!(ReferenceMode { Off, TypeOnly, Full }, default = TypeOnly);

/// A constraint key, e.g. `"dom-3"` or `"us-core-6"`.
pub type ConstraintId = String;

/// Reclassifies a specific constraint's emitted severity, independent of
/// `ConstraintSeverity` on the `ElementDefinition.constraint` itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintLevelOverride {
    pub key: ConstraintId,
    pub severity: IssueSeverity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirConfig {
    pub version: FhirVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub mode: SchemaMode,
    pub allow_unknown_elements: bool,
    pub allow_modifier_extensions: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            mode: SchemaMode::default(),
            allow_unknown_elements: false,
            allow_modifier_extensions: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub mode: ProfilesMode,
    pub explicit_profiles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintsConfig {
    pub mode: ConstraintsMode,
    pub best_practice: BestPracticeMode,
    pub suppress: Vec<ConstraintId>,
    pub level_overrides: Vec<ConstraintLevelOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminologyConfig {
    pub mode: TerminologyMode,
    pub extensible_handling: ExtensibleHandling,
    /// Milliseconds. Kept as a plain integer (rather than `Duration`
    /// directly) so it round-trips through YAML without a custom
    /// (de)serializer.
    pub timeout_ms: u64,
    pub on_timeout: TimeoutPolicy,
    pub cache: CachePolicy,
}

impl Default for TerminologyConfig {
    fn default() -> Self {
        Self {
            mode: TerminologyMode::default(),
            extensible_handling: ExtensibleHandling::default(),
            timeout_ms: 5000,
            on_timeout: TimeoutPolicy::default(),
            cache: CachePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencesConfig {
    pub mode: ReferenceMode,
    pub allow_external: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Check that a non-URN `entry.fullUrl` agrees with `entry.resource.id`.
    pub check_fullurl_consistency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub fail_fast: bool,
    pub max_issues: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_issues: 1000,
        }
    }
}

/// Declarative, serializable validator configuration.
///
/// Construct via [`ValidatorConfig::preset`], [`ValidatorConfig::builder`],
/// or [`ValidatorConfig::from_yaml`]; turn into an executable
/// [`ValidationPlan`] with [`ValidatorConfig::compile`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub fhir: FhirConfig,
    pub schema: SchemaConfig,
    pub profiles: ProfilesConfig,
    pub constraints: ConstraintsConfig,
    pub terminology: TerminologyConfig,
    pub references: ReferencesConfig,
    pub bundle: BundleConfig,
    pub exec: ExecConfig,
}

/// The same shape as `ValidatorConfig`, but every section is optional so a
/// YAML document only needs to name the sections it overrides; missing
/// sections fall back to the selected preset (or `Preset::Ingestion` if none
/// is named).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    preset: Option<Preset>,
    fhir: Option<FhirConfig>,
    schema: Option<SchemaConfig>,
    profiles: Option<ProfilesConfig>,
    constraints: Option<ConstraintsConfig>,
    terminology: Option<TerminologyConfig>,
    references: Option<ReferencesConfig>,
    bundle: Option<BundleConfig>,
    exec: Option<ExecConfig>,
}

impl ValidatorConfig {
    /// Start from one of the named deployment shapes.
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Ingestion => Self {
                schema: SchemaConfig {
                    mode: SchemaMode::On,
                    ..Default::default()
                },
                profiles: ProfilesConfig {
                    mode: ProfilesMode::Off,
                    ..Default::default()
                },
                constraints: ConstraintsConfig {
                    mode: ConstraintsMode::Off,
                    ..Default::default()
                },
                terminology: TerminologyConfig {
                    mode: TerminologyMode::Off,
                    ..Default::default()
                },
                references: ReferencesConfig {
                    mode: ReferenceMode::Off,
                    ..Default::default()
                },
                exec: ExecConfig {
                    fail_fast: true,
                    max_issues: 100,
                },
                ..Default::default()
            },
            Preset::Server => Self {
                schema: SchemaConfig {
                    mode: SchemaMode::On,
                    ..Default::default()
                },
                profiles: ProfilesConfig {
                    mode: ProfilesMode::On,
                    ..Default::default()
                },
                constraints: ConstraintsConfig {
                    mode: ConstraintsMode::Full,
                    best_practice: BestPracticeMode::Ignore,
                    ..Default::default()
                },
                terminology: TerminologyConfig {
                    mode: TerminologyMode::Local,
                    ..Default::default()
                },
                references: ReferencesConfig {
                    mode: ReferenceMode::TypeOnly,
                    ..Default::default()
                },
                exec: ExecConfig {
                    fail_fast: false,
                    max_issues: 1000,
                },
                ..Default::default()
            },
            Preset::Authoring => Self {
                schema: SchemaConfig {
                    mode: SchemaMode::On,
                    ..Default::default()
                },
                profiles: ProfilesConfig {
                    mode: ProfilesMode::On,
                    ..Default::default()
                },
                constraints: ConstraintsConfig {
                    mode: ConstraintsMode::Full,
                    best_practice: BestPracticeMode::Warn,
                    ..Default::default()
                },
                terminology: TerminologyConfig {
                    mode: TerminologyMode::Local,
                    ..Default::default()
                },
                references: ReferencesConfig {
                    mode: ReferenceMode::Full,
                    ..Default::default()
                },
                exec: ExecConfig {
                    fail_fast: false,
                    max_issues: 10_000,
                },
                ..Default::default()
            },
            Preset::Publication => {
                let mut cfg = Self::preset(Preset::Authoring);
                cfg.constraints.best_practice = BestPracticeMode::Error;
                cfg
            }
        }
    }

    pub fn builder() -> ValidatorConfigBuilder {
        ValidatorConfigBuilder {
            cfg: Self::preset(Preset::Ingestion),
        }
    }

    /// Parse a YAML document into an override layer applied over the named
    /// (or default) preset.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let mut cfg = Self::preset(file.preset.unwrap_or(Preset::Ingestion));
        if let Some(v) = file.fhir {
            cfg.fhir = v;
        }
        if let Some(v) = file.schema {
            cfg.schema = v;
        }
        if let Some(v) = file.profiles {
            cfg.profiles = v;
        }
        if let Some(v) = file.constraints {
            cfg.constraints = v;
        }
        if let Some(v) = file.terminology {
            cfg.terminology = v;
        }
        if let Some(v) = file.references {
            cfg.references = v;
        }
        if let Some(v) = file.bundle {
            cfg.bundle = v;
        }
        if let Some(v) = file.exec {
            cfg.exec = v;
        }
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    /// Compile into an executable plan, rejecting combinations that cannot
    /// produce a coherent validation run.
    #[tracing::instrument(skip(self))]
    pub fn compile(&self) -> Result<ValidationPlan, ConfigError> {
        if self.references.mode == ReferenceMode::Full && self.terminology.mode == TerminologyMode::Off
        {
            return Err(ConfigError::TerminologyRequiredForFullRef);
        }

        let mut steps = Vec::new();

        if self.schema.mode == SchemaMode::On {
            steps.push(Step::Schema(SchemaPlan::from(&self.schema)));
        }
        if self.profiles.mode == ProfilesMode::On {
            steps.push(Step::Profiles(ProfilesPlan::from(&self.profiles)));
        }
        if self.constraints.mode != ConstraintsMode::Off {
            steps.push(Step::Constraints(ConstraintsPlan::from(&self.constraints)));
        }
        if self.terminology.mode != TerminologyMode::Off {
            steps.push(Step::Terminology(TerminologyPlan::from(&self.terminology)));
        }
        if self.references.mode != ReferenceMode::Off {
            steps.push(Step::References(ReferencesPlan::from(&self.references)));
        }
        steps.push(Step::Bundles(BundlePlan::from(&self.bundle)));

        Ok(ValidationPlan {
            steps,
            fail_fast: self.exec.fail_fast,
            max_issues: self.exec.max_issues,
        })
    }
}

/// Fluent builder over [`ValidatorConfig`], starting from a preset (default
/// `Preset::Ingestion`) and layering overrides on top.
pub struct ValidatorConfigBuilder {
    cfg: ValidatorConfig,
}

impl ValidatorConfigBuilder {
    pub fn preset(mut self, preset: Preset) -> Self {
        self.cfg = ValidatorConfig::preset(preset);
        self
    }

    pub fn fhir_version(mut self, version: FhirVersion) -> Self {
        self.cfg.fhir.version = version;
        self
    }

    pub fn schema_mode(mut self, mode: SchemaMode) -> Self {
        self.cfg.schema.mode = mode;
        self
    }

    pub fn profiles_mode(mut self, mode: ProfilesMode) -> Self {
        self.cfg.profiles.mode = mode;
        self
    }

    pub fn constraints_mode(mut self, mode: ConstraintsMode) -> Self {
        self.cfg.constraints.mode = mode;
        self
    }

    pub fn best_practice(mut self, mode: BestPracticeMode) -> Self {
        self.cfg.constraints.best_practice = mode;
        self
    }

    pub fn terminology_mode(mut self, mode: TerminologyMode) -> Self {
        self.cfg.terminology.mode = mode;
        self
    }

    pub fn reference_mode(mut self, mode: ReferenceMode) -> Self {
        self.cfg.references.mode = mode;
        self
    }

    pub fn fail_fast(mut self, value: bool) -> Self {
        self.cfg.exec.fail_fast = value;
        self
    }

    pub fn max_issues(mut self, value: usize) -> Self {
        self.cfg.exec.max_issues = value;
        self
    }

    pub fn build(self) -> ValidatorConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_preset_skips_terminology_and_references() {
        let plan = ValidatorConfig::preset(Preset::Ingestion).compile().unwrap();
        assert!(!plan
            .steps
            .iter()
            .any(|s| matches!(s, Step::Terminology(_) | Step::References(_))));
        assert!(plan.fail_fast);
    }

    #[test]
    fn server_preset_enables_profiles_and_terminology() {
        let plan = ValidatorConfig::preset(Preset::Server).compile().unwrap();
        assert!(plan.steps.iter().any(|s| matches!(s, Step::Profiles(_))));
        assert!(plan.steps.iter().any(|s| matches!(s, Step::Terminology(_))));
    }

    #[test]
    fn full_reference_mode_requires_terminology() {
        let cfg = ValidatorConfig::builder()
            .reference_mode(ReferenceMode::Full)
            .terminology_mode(TerminologyMode::Off)
            .build();
        assert!(matches!(
            cfg.compile(),
            Err(ConfigError::TerminologyRequiredForFullRef)
        ));
    }

    #[test]
    fn builder_overrides_preset_fields() {
        let cfg = ValidatorConfig::builder()
            .preset(Preset::Server)
            .terminology_mode(TerminologyMode::Local)
            .fail_fast(true)
            .max_issues(500)
            .build();
        assert_eq!(cfg.exec.max_issues, 500);
        assert!(cfg.exec.fail_fast);
        assert_eq!(cfg.terminology.mode, TerminologyMode::Local);
    }

    #[test]
    fn yaml_round_trips_through_preset_and_overrides() {
        let yaml = r#"
preset: Authoring
fhir:
  version: R5
terminology:
  mode: Local
  timeout_ms: 2000
constraints:
  mode: Full
  best_practice: Warn
  suppress:
    - "dom-6"
exec:
  fail_fast: false
  max_issues: 1000
"#;
        let cfg = ValidatorConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.fhir.version, FhirVersion::R5);
        assert_eq!(cfg.constraints.suppress, vec!["dom-6".to_string()]);
        assert!(cfg.compile().is_ok());
    }

    #[test]
    fn exports_back_to_yaml() {
        let cfg = ValidatorConfig::preset(Preset::Publication);
        let yaml = cfg.to_yaml().unwrap();
        assert!(yaml.contains("best_practice"));
    }
}
