//! Module: model
//! Responsibility: runtime entity metadata and the row shape exchanged with stores.
//! Does not own: query planning, storage, or predicate semantics.
//! Boundary: schema facts consulted by the name parser, compiler, and paging engine.

mod row;


pub use row::{FromRow, Row, RowDecodeError};

///
/// EntityModel
///
/// Runtime description of one entity: its name, identity field, plain fields,
/// and explicit foreign-key relations.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntityModel {
    name: String,
    primary_key: String,
    fields: Vec<String>,
    relations: Vec<RelationModel>,
}

impl EntityModel {
    /// Build a model whose identity field is `primary_key`.
    #[must_use]
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();

        Self {
            name: name.into(),
            fields: vec![primary_key.clone()],
            primary_key,
            relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.has_field(&name) {
            self.fields.push(name);
        }
        self
    }

    /// Register a relation; its foreign-key field is added as a plain field.
    #[must_use]
    pub fn relation(mut self, relation: RelationModel) -> Self {
        self = self.field(relation.foreign_key.clone());
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    #[must_use]
    pub fn relations(&self) -> &[RelationModel] {
        &self.relations
    }

    #[must_use]
    pub fn relation_named(&self, name: &str) -> Option<&RelationModel> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Resolve a derived-name path against this model.
    ///
    /// Relation names resolve to their foreign-key field, so `TeamIsNull`
    /// reads the `teamId` column.
    #[must_use]
    pub fn resolve_field(&self, name: &str) -> Option<&str> {
        if let Some(field) = self.fields.iter().find(|f| *f == name) {
            return Some(field.as_str());
        }

        self.relation_named(name).map(|r| r.foreign_key.as_str())
    }
}

///
/// RelationModel
///
/// Many-to-one association expressed as a foreign-key field plus the target
/// entity's key. Related rows are only loaded by an explicit fetch.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelationModel {
    pub name: String,
    pub foreign_key: String,
    pub target: String,
    pub target_key: String,
}

impl RelationModel {
    #[must_use]
    pub fn many_to_one(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        target: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            foreign_key: foreign_key.into(),
            target: target.into(),
            target_key: target_key.into(),
        }
    }
}
