use serde_json::Value as Json;

/// A FHIRPath collection. Every expression evaluates to one of these; FHIRPath
/// has no scalar type distinct from a singleton collection.
#[derive(Debug, Clone, Default)]
pub struct Collection(pub Vec<Json>);

impl Collection {
    pub fn empty() -> Self {
        Collection(Vec::new())
    }

    pub fn single(v: Json) -> Self {
        Collection(vec![v])
    }

    pub fn boolean(b: bool) -> Self {
        Collection(vec![Json::Bool(b)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// FHIRPath truthiness: empty collection is false, a single boolean is its
    /// value, any other non-empty collection is true.
    pub fn to_boolean(&self) -> bool {
        match self.0.as_slice() {
            [] => false,
            [Json::Bool(b)] => *b,
            _ => true,
        }
    }

    /// Like `to_boolean` but distinguishes "empty" for three-valued comparison
    /// semantics used by the equality/comparison operators.
    pub fn to_boolean_opt(&self) -> Option<bool> {
        match self.0.as_slice() {
            [] => None,
            [Json::Bool(b)] => Some(*b),
            _ => Some(true),
        }
    }

    pub fn push(&mut self, v: Json) {
        self.0.push(v);
    }

    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Json> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Json> {
        self.0
    }
}

impl From<Vec<Json>> for Collection {
    fn from(v: Vec<Json>) -> Self {
        Collection(v)
    }
}
