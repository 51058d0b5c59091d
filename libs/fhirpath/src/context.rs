use serde_json::Value as Json;
use std::collections::HashMap;

/// Evaluation context: the root resource (`%resource`/`%context`) plus any
/// caller-supplied environment variables.
#[derive(Debug, Clone)]
pub struct Context {
    pub resource: Json,
    pub env: HashMap<String, Json>,
}

impl Context {
    pub fn new(resource: Json) -> Self {
        Self {
            resource,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, name: impl Into<String>, value: Json) -> Self {
        self.env.insert(name.into(), value);
        self
    }
}
