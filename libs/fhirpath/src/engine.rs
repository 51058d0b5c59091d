use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::ast::Expr;
use crate::context::Context;
use crate::error::Result;
use crate::functions;
use crate::parser;
use crate::value::Collection;

/// A compiled FHIRPath expression, ready to evaluate against any `Context`.
#[derive(Debug, Clone)]
pub struct Plan(std::sync::Arc<Expr>);

/// Reserved for future compile-time tuning (e.g. strict vs. lenient function
/// resolution). Present now so callers have a stable construction surface.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub strict_functions: bool,
}

/// Reserved for future evaluate-time tuning (e.g. a deadline or step budget).
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub max_steps: Option<usize>,
}

const DEFAULT_CACHE_SIZE: usize = 256;

/// Compiles and evaluates FHIRPath expressions, caching compiled plans by
/// their source string so a constraint re-checked across many resources of
/// the same profile only pays the parse cost once.
pub struct Engine {
    cache: Mutex<LruCache<String, Plan>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(size: usize) -> Self {
        let size = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(size)),
        }
    }

    /// Compile `expression`, reusing a cached plan when this exact string was
    /// compiled before.
    #[tracing::instrument(skip(self, _options))]
    pub fn compile(&self, expression: &str, _options: &CompileOptions) -> Result<Plan> {
        if let Some(plan) = self.cache.lock().unwrap().get(expression) {
            return Ok(plan.clone());
        }
        let expr = parser::parse(expression)?;
        let plan = Plan(std::sync::Arc::new(expr));
        self.cache
            .lock()
            .unwrap()
            .put(expression.to_string(), plan.clone());
        Ok(plan)
    }

    /// Compile and evaluate in one step without touching the cache directly.
    pub fn evaluate_str(
        &self,
        expression: &str,
        ctx: &Context,
        options: &EvalOptions,
    ) -> Result<Collection> {
        let plan = self.compile(expression, &CompileOptions::default())?;
        self.evaluate(&plan, ctx, options)
    }

    #[tracing::instrument(skip(self, plan, ctx, _options))]
    pub fn evaluate(
        &self,
        plan: &Plan,
        ctx: &Context,
        _options: &EvalOptions,
    ) -> Result<Collection> {
        let root = Collection::single(ctx.resource.clone());
        functions::eval(&plan.0, &root, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(resource: serde_json::Value) -> Context {
        Context::new(resource)
    }

    #[test]
    fn evaluates_simple_member_path() {
        let engine = Engine::new();
        let c = ctx(json!({"resourceType": "Patient", "name": [{"family": "Doe"}]}));
        let result = engine
            .evaluate_str("name.family", &c, &EvalOptions::default())
            .unwrap();
        assert_eq!(result.into_vec(), vec![json!("Doe")]);
    }

    #[test]
    fn caches_compiled_plan_across_calls() {
        let engine = Engine::new();
        let plan1 = engine.compile("name.family", &CompileOptions::default()).unwrap();
        let plan2 = engine.compile("name.family", &CompileOptions::default()).unwrap();
        assert!(std::sync::Arc::ptr_eq(&plan1.0, &plan2.0));
    }

    #[test]
    fn evaluates_dom4_style_invariant() {
        let engine = Engine::new();
        let c = ctx(json!({
            "resourceType": "Patient",
            "contained": [{"resourceType": "Organization", "meta": {}}]
        }));
        let result = engine
            .evaluate_str(
                "contained.meta.versionId.empty() and contained.meta.lastUpdated.empty()",
                &c,
                &EvalOptions::default(),
            )
            .unwrap();
        assert!(result.to_boolean());
    }

    #[test]
    fn evaluates_where_and_exists() {
        let engine = Engine::new();
        let c = ctx(json!({
            "resourceType": "Patient",
            "identifier": [
                {"system": "urn:a", "value": "1"},
                {"system": "urn:b", "value": "2"}
            ]
        }));
        let result = engine
            .evaluate_str(
                "identifier.where(system = 'urn:b').exists()",
                &c,
                &EvalOptions::default(),
            )
            .unwrap();
        assert!(result.to_boolean());
    }

    #[test]
    fn boolean_and_is_three_valued() {
        let engine = Engine::new();
        let c = ctx(json!({"resourceType": "Patient"}));
        let result = engine
            .evaluate_str("true and missingField.exists()", &c, &EvalOptions::default())
            .unwrap();
        assert_eq!(result.into_vec(), vec![json!(false)]);
    }
}
