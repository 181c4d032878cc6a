use crate::db::query::plan::{LockMode, Projection, QueryHints, ResultShape};

///
/// MethodSignature
///
/// Registration input for one repository method: its name, declared
/// parameter names, result shape, and the optional declarative extras.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<String>,
    pub shape: ResultShape,
    pub projection: Projection,
    pub query: Option<String>,
    pub count_query: Option<String>,
    pub hints: QueryHints,
    pub lock: LockMode,
    pub entity_graph: Vec<String>,
}

impl MethodSignature {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: ResultShape) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            shape,
            projection: Projection::Entity,
            query: None,
            count_query: None,
            hints: QueryHints::default(),
            lock: LockMode::None,
            entity_graph: Vec::new(),
        }
    }

    /// Declare the next parameter name, in argument order.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    /// Attach a declared query template; it takes precedence over name derivation.
    #[must_use]
    pub fn query(mut self, template: impl Into<String>) -> Self {
        self.query = Some(template.into());
        self
    }

    #[must_use]
    pub fn count_query(mut self, template: impl Into<String>) -> Self {
        self.count_query = Some(template.into());
        self
    }

    #[must_use]
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.hints.read_only = true;
        self
    }

    #[must_use]
    pub fn hints(mut self, hints: QueryHints) -> Self {
        self.hints = hints;
        self
    }

    #[must_use]
    pub const fn lock(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    /// Name a relation the store should load alongside each row.
    #[must_use]
    pub fn entity_graph(mut self, relation: impl Into<String>) -> Self {
        self.entity_graph.push(relation.into());
        self
    }
}
