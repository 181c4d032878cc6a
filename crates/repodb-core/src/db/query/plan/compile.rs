use crate::{
    db::query::{
        name::{ParsedMethod, QueryKind, parse_with_model},
        order::SortKey,
        plan::{
            LockMode, MethodSignature, ParamSlot, PlanCache, PlanFingerprint, PlanSource,
            Projection, QueryHints, QueryPlan, ResultShape, fingerprint::FingerprintInput,
        },
        predicate::{Combinator, Conjunction, Filter, Term},
        template::{StatementKind, Template},
    },
    error::Error,
    model::EntityModel,
    obs::sink::{self, MetricsEvent},
};
use derive_more::Display;
use std::{collections::BTreeMap, convert::Infallible, sync::Arc};
use thiserror::Error as ThisError;

///
/// NamedQueries
///
/// Entity-scoped declared templates keyed `"<Entity>.<method>"`.
/// Consulted when a signature carries no template of its own.
///

#[derive(Clone, Debug, Default)]
pub struct NamedQueries {
    queries: BTreeMap<String, String>,
}

impl NamedQueries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.queries.insert(key.into(), template.into());
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.register(key, template);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.queries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

///
/// CompileError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("cannot compile '{signature}': {kind}")]
pub struct CompileError {
    pub signature: String,
    pub kind: CompileErrorKind,
}

///
/// CompileErrorKind
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum CompileErrorKind {
    #[display("placeholder ':{placeholder}' has no declared parameter")]
    UnboundPlaceholder { placeholder: String },

    #[display("declared parameter '{name}' is not referenced by the template")]
    UnusedParameter { name: String },

    #[display("parameter '{name}' is declared more than once")]
    DuplicateParameter { name: String },

    #[display("derived predicates cannot mix And and Or")]
    AmbiguousConjunction,

    #[display("predicate takes {expected} arguments but {declared} parameter names were declared")]
    ParameterCountMismatch { expected: usize, declared: usize },

    #[display("declared template is empty")]
    EmptyTemplate,

    #[display("expected {expected} statement, found {found}")]
    StatementMismatch {
        expected: StatementKind,
        found: StatementKind,
    },

    #[display("unknown field '{field}'")]
    UnknownField { field: String },

    #[display("unknown relation '{name}'")]
    UnknownRelation { name: String },
}

impl CompileError {
    fn new(signature: &str, kind: CompileErrorKind) -> Self {
        Self {
            signature: signature.to_string(),
            kind,
        }
    }
}

///
/// PredicateCompiler
///
/// Turns a registered method signature into an immutable, cached plan.
/// Declared templates (explicit, then named) win over name derivation.
///

pub struct PredicateCompiler<'a> {
    model: &'a EntityModel,
    cache: &'a PlanCache,
    named: &'a NamedQueries,
}

// Selection fields shared by the declared and derived paths.
struct Selection {
    kind: QueryKind,
    source: PlanSource,
    parameters: Vec<ParamSlot>,
    limit: Option<u32>,
    distinct: bool,
    order: Vec<SortKey>,
}

impl<'a> PredicateCompiler<'a> {
    #[must_use]
    pub const fn new(model: &'a EntityModel, cache: &'a PlanCache, named: &'a NamedQueries) -> Self {
        Self {
            model,
            cache,
            named,
        }
    }

    /// Compile `signature`, returning the cached plan when an identical
    /// registration was compiled before.
    pub fn compile(&self, signature: &MethodSignature) -> Result<Arc<QueryPlan>, Error> {
        let template = self.resolve_template(signature);
        let fingerprint = FingerprintInput {
            model: self.model,
            signature: &signature.name,
            template,
            count_template: signature.count_query.as_deref(),
            params: &signature.params,
            shape: signature.shape,
            projection: &signature.projection,
            hints: &signature.hints,
            lock: signature.lock,
            entity_graph: &signature.entity_graph,
        }
        .fingerprint();

        let (plan, hit) = self
            .cache
            .get_or_try_insert_with(fingerprint, || self.build(signature, template, fingerprint))?;

        let entity = self.model.name();
        if hit {
            sink::record(MetricsEvent::PlanCacheHit { entity });
        } else {
            sink::record(MetricsEvent::PlanCompiled {
                entity,
                declared: plan.is_declared(),
            });
        }

        Ok(plan)
    }

    /// Compile a predicate-free plan over every row of the entity.
    ///
    /// Backs the built-in `find_all`/`count_all` operations; `name` keys the
    /// cache entry and should not collide with a derivable method name.
    pub fn compile_unfiltered(&self, name: &str, kind: QueryKind, shape: ResultShape) -> Arc<QueryPlan> {
        let fingerprint = FingerprintInput {
            model: self.model,
            signature: name,
            template: None,
            count_template: None,
            params: &[],
            shape,
            projection: &Projection::Entity,
            hints: &QueryHints::default(),
            lock: LockMode::None,
            entity_graph: &[],
        }
        .fingerprint();

        let Ok((plan, hit)) = self
            .cache
            .get_or_try_insert_with::<Infallible>(fingerprint, || {
                Ok(QueryPlan {
                    signature: name.to_string(),
                    entity: self.model.name().to_string(),
                    primary_key: self.model.primary_key().to_string(),
                    kind,
                    source: PlanSource::Derived(Filter::all()),
                    parameters: Vec::new(),
                    projection: Projection::Entity,
                    shape,
                    limit: None,
                    distinct: false,
                    order: Vec::new(),
                    count_query: None,
                    hints: QueryHints::default(),
                    lock: LockMode::None,
                    entity_graph: Vec::new(),
                    fingerprint,
                })
            });

        let entity = self.model.name();
        if hit {
            sink::record(MetricsEvent::PlanCacheHit { entity });
        } else {
            sink::record(MetricsEvent::PlanCompiled {
                entity,
                declared: false,
            });
        }

        plan
    }

    fn resolve_template<'s>(&'s self, signature: &'s MethodSignature) -> Option<&'s str> {
        signature.query.as_deref().or_else(|| {
            let key = format!("{}.{}", self.model.name(), signature.name);
            self.named.get(&key)
        })
    }

    fn build(
        &self,
        signature: &MethodSignature,
        template: Option<&str>,
        fingerprint: PlanFingerprint,
    ) -> Result<QueryPlan, Error> {
        let name = signature.name.as_str();

        if let Some(dup) = first_duplicate(&signature.params) {
            return Err(CompileError::new(
                name,
                CompileErrorKind::DuplicateParameter {
                    name: dup.to_string(),
                },
            )
            .into());
        }

        for relation in &signature.entity_graph {
            if self.model.relation_named(relation).is_none() {
                return Err(CompileError::new(
                    name,
                    CompileErrorKind::UnknownRelation {
                        name: relation.clone(),
                    },
                )
                .into());
            }
        }

        let selection = match template {
            Some(text) => {
                let template = Template::scan(text);
                let parameters =
                    check_declared(name, &template, &signature.params, StatementKind::Select)?;
                Selection {
                    kind: QueryKind::Select,
                    source: PlanSource::Declared(template),
                    parameters,
                    limit: None,
                    distinct: false,
                    order: Vec::new(),
                }
            }
            None => {
                let parsed = parse_with_model(self.model, name)?;
                self.check_projection(name, &signature.projection)?;
                derive_selection(name, parsed, &signature.params)?
            }
        };

        let count_query = match signature.count_query.as_deref() {
            Some(text) => {
                let count = Template::scan(text);
                if count.is_blank() {
                    return Err(CompileError::new(name, CompileErrorKind::EmptyTemplate).into());
                }
                if let Some(placeholder) = count
                    .placeholders()
                    .iter()
                    .find(|p| !selection.parameters.iter().any(|slot| &slot.name == *p))
                {
                    return Err(CompileError::new(
                        name,
                        CompileErrorKind::UnboundPlaceholder {
                            placeholder: placeholder.clone(),
                        },
                    )
                    .into());
                }
                Some(count)
            }
            None => None,
        };

        Ok(QueryPlan {
            signature: signature.name.clone(),
            entity: self.model.name().to_string(),
            primary_key: self.model.primary_key().to_string(),
            kind: selection.kind,
            source: selection.source,
            parameters: selection.parameters,
            projection: signature.projection.clone(),
            shape: signature.shape,
            limit: selection.limit,
            distinct: selection.distinct,
            order: selection.order,
            count_query,
            hints: signature.hints.clone(),
            lock: signature.lock,
            entity_graph: signature.entity_graph.clone(),
            fingerprint,
        })
    }

    fn check_projection(&self, name: &str, projection: &Projection) -> Result<(), CompileError> {
        let fields: &[String] = match projection {
            Projection::Entity => &[],
            Projection::Scalar(field) => std::slice::from_ref(field),
            Projection::Dto(fields) => fields,
        };

        match fields.iter().find(|f| !self.model.has_field(f)) {
            Some(field) => Err(CompileError::new(
                name,
                CompileErrorKind::UnknownField {
                    field: field.clone(),
                },
            )),
            None => Ok(()),
        }
    }
}

// Build the filter and parameter slots for a parsed method name.
fn derive_selection(
    name: &str,
    parsed: ParsedMethod,
    declared: &[String],
) -> Result<Selection, CompileError> {
    let uses_and = parsed.tokens.iter().any(|t| t.conjunction == Conjunction::And);
    let uses_or = parsed.tokens.iter().any(|t| t.conjunction == Conjunction::Or);
    if uses_and && uses_or {
        return Err(CompileError::new(
            name,
            CompileErrorKind::AmbiguousConjunction,
        ));
    }

    let expected: usize = parsed.tokens.iter().map(|t| t.operator.arity()).sum();
    if !declared.is_empty() && declared.len() != expected {
        return Err(CompileError::new(
            name,
            CompileErrorKind::ParameterCountMismatch {
                expected,
                declared: declared.len(),
            },
        ));
    }

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut parameters = Vec::with_capacity(expected);
    let mut terms = Vec::with_capacity(parsed.tokens.len());

    for token in &parsed.tokens {
        let param = if token.operator.arity() == 0 {
            None
        } else {
            let slot_name = match declared.get(parameters.len()) {
                Some(declared) => declared.clone(),
                None => {
                    let n = seen.entry(token.field.as_str()).or_insert(0);
                    *n += 1;
                    if *n == 1 {
                        token.field.clone()
                    } else {
                        format!("{}_{n}", token.field)
                    }
                }
            };
            parameters.push(ParamSlot {
                name: slot_name.clone(),
                collection: token.operator.takes_collection(),
            });
            Some(slot_name)
        };

        terms.push(Term {
            field: token.field.clone(),
            operator: token.operator,
            param,
        });
    }

    let combinator = if uses_or {
        Combinator::Any
    } else {
        Combinator::All
    };

    Ok(Selection {
        kind: parsed.kind,
        source: PlanSource::Derived(Filter { combinator, terms }),
        parameters,
        limit: parsed.limit,
        distinct: parsed.distinct,
        order: parsed.order,
    })
}

/// Check a declared template against its declared parameter names.
///
/// Every placeholder must be declared and every declared name used; the
/// statement must be a read for `StatementKind::Select` and a mutation
/// otherwise.
pub(crate) fn check_declared(
    name: &str,
    template: &Template,
    params: &[String],
    expected: StatementKind,
) -> Result<Vec<ParamSlot>, CompileError> {
    if template.is_blank() {
        return Err(CompileError::new(name, CompileErrorKind::EmptyTemplate));
    }

    if let Some(dup) = first_duplicate(params) {
        return Err(CompileError::new(
            name,
            CompileErrorKind::DuplicateParameter {
                name: dup.to_string(),
            },
        ));
    }

    let found = template.statement_kind();
    if found.is_mutation() != expected.is_mutation() {
        return Err(CompileError::new(
            name,
            CompileErrorKind::StatementMismatch { expected, found },
        ));
    }

    if let Some(placeholder) = template
        .placeholders()
        .iter()
        .find(|p| !params.contains(p))
    {
        return Err(CompileError::new(
            name,
            CompileErrorKind::UnboundPlaceholder {
                placeholder: placeholder.clone(),
            },
        ));
    }

    if let Some(unused) = params
        .iter()
        .find(|p| !template.placeholders().contains(p))
    {
        return Err(CompileError::new(
            name,
            CompileErrorKind::UnusedParameter {
                name: unused.clone(),
            },
        ));
    }

    Ok(params
        .iter()
        .map(|p| ParamSlot {
            name: p.clone(),
            collection: template.is_collection(p),
        })
        .collect())
}

fn first_duplicate(params: &[String]) -> Option<&str> {
    params
        .iter()
        .enumerate()
        .find(|(i, p)| params[..*i].contains(p))
        .map(|(_, p)| p.as_str())
}
