use crate::{
    db::query::{
        name::{ParseErrorKind, QueryKind},
        plan::{
            CompileErrorKind, MethodSignature, NamedQueries, ParamSlot, PlanCache,
            PredicateCompiler, Projection, QueryPlan, ResultShape,
        },
        predicate::{Combinator, Operator},
        template::StatementKind,
    },
    config::RepositoryConfig,
    db::{
        executor::QueryExecutor,
        query::Arguments,
        response::QueryResult,
    },
    error::Error,
    model::EntityModel,
    obs::{metrics_report, metrics_reset_all},
    test_fixtures::{member_model, seeded_store},
};
use std::{sync::Arc, thread};

fn compile_with(
    cache: &PlanCache,
    named: &NamedQueries,
    signature: &MethodSignature,
) -> Result<Arc<QueryPlan>, Error> {
    let model = member_model();
    PredicateCompiler::new(&model, cache, named).compile(signature)
}

fn compile(signature: &MethodSignature) -> Result<Arc<QueryPlan>, Error> {
    compile_with(&PlanCache::new(), &NamedQueries::new(), signature)
}

fn compile_err(signature: &MethodSignature) -> CompileErrorKind {
    match compile(signature) {
        Err(Error::Compile(err)) => err.kind,
        other => panic!("expected a compile error, got {other:?}"),
    }
}

fn slot(name: &str, collection: bool) -> ParamSlot {
    ParamSlot {
        name: name.to_string(),
        collection,
    }
}

//
// Derived plans
//

#[test]
fn derived_plan_keeps_token_order_and_defaults_slot_names() {
    let plan = compile(&MethodSignature::new(
        "findByUsernameAndAgeGreaterThan",
        ResultShape::List,
    ))
    .expect("derived plan");

    let filter = plan.filter().expect("derived filter");
    assert_eq!(filter.combinator, Combinator::All);
    assert_eq!(filter.terms.len(), 2);
    assert_eq!(filter.terms[0].field, "username");
    assert_eq!(filter.terms[1].operator, Operator::GreaterThan);
    assert_eq!(plan.parameters, vec![slot("username", false), slot("age", false)]);
    assert_eq!(plan.kind, QueryKind::Select);
    assert_eq!(plan.primary_key, "id");
    assert!(!plan.is_declared());
}

#[test]
fn declared_parameter_names_rename_slots() {
    let plan = compile(
        &MethodSignature::new("findByUsernameAndAgeGreaterThan", ResultShape::List)
            .param("name")
            .param("minAge"),
    )
    .expect("derived plan");

    assert_eq!(plan.parameters, vec![slot("name", false), slot("minAge", false)]);
    assert_eq!(
        plan.filter().expect("filter").terms[1].param.as_deref(),
        Some("minAge")
    );
}

#[test]
fn declared_parameter_count_must_match_arity() {
    let kind = compile_err(
        &MethodSignature::new("findByUsernameAndTeamIsNull", ResultShape::List)
            .param("username")
            .param("extra"),
    );

    assert_eq!(
        kind,
        CompileErrorKind::ParameterCountMismatch {
            expected: 1,
            declared: 2,
        }
    );
}

#[test]
fn mixing_and_with_or_is_ambiguous() {
    let kind = compile_err(&MethodSignature::new(
        "findByUsernameAndAgeOrTeam",
        ResultShape::List,
    ));

    assert_eq!(kind, CompileErrorKind::AmbiguousConjunction);
}

#[test]
fn or_chains_compile_to_any() {
    let plan = compile(&MethodSignature::new(
        "findByUsernameOrAge",
        ResultShape::List,
    ))
    .expect("or plan");

    assert_eq!(plan.filter().expect("filter").combinator, Combinator::Any);
}

#[test]
fn repeated_fields_get_numbered_slots() {
    let plan = compile(&MethodSignature::new(
        "findByAgeGreaterThanAndAgeLessThan",
        ResultShape::List,
    ))
    .expect("range plan");

    assert_eq!(plan.parameters, vec![slot("age", false), slot("age_2", false)]);
}

#[test]
fn in_slots_are_collections_and_nullary_operators_take_none() {
    let plan = compile(&MethodSignature::new(
        "findByUsernameInAndTeamIsNull",
        ResultShape::List,
    ))
    .expect("in plan");

    assert_eq!(plan.parameters, vec![slot("username", true)]);
    assert_eq!(plan.filter().expect("filter").terms[1].param, None);
    assert_eq!(plan.filter().expect("filter").terms[1].field, "teamId");
}

#[test]
fn verb_prefix_selects_plan_kind_and_top_n_sets_limit() {
    let count = compile(&MethodSignature::new("countByAge", ResultShape::Single)).expect("count");
    let exists = compile(&MethodSignature::new("existsByUsername", ResultShape::Single))
        .expect("exists");
    let delete = compile(&MethodSignature::new("deleteByAge", ResultShape::List)).expect("delete");
    let top = compile(&MethodSignature::new(
        "findTop3ByOrderByAgeDesc",
        ResultShape::List,
    ))
    .expect("top");

    assert_eq!(count.kind, QueryKind::Count);
    assert_eq!(exists.kind, QueryKind::Exists);
    assert_eq!(delete.kind, QueryKind::Delete);
    assert_eq!(top.limit, Some(3));
    assert!(top.filter().expect("filter").is_empty());
    assert_eq!(top.order.len(), 1);
}

#[test]
fn parse_failures_surface_as_parse_errors() {
    let err = compile(&MethodSignature::new("findByNickname", ResultShape::List))
        .expect_err("unknown field");

    assert!(matches!(
        err,
        Error::Parse(ref parse) if matches!(parse.kind, ParseErrorKind::UnknownOperator { .. })
    ));
}

#[test]
fn derived_projection_fields_must_exist() {
    let kind = compile_err(
        &MethodSignature::new("findByAge", ResultShape::List)
            .projection(Projection::Dto(vec!["username".into(), "nickname".into()])),
    );
    assert_eq!(
        kind,
        CompileErrorKind::UnknownField {
            field: "nickname".into(),
        }
    );

    let plan = compile(
        &MethodSignature::new("findByAge", ResultShape::List)
            .projection(Projection::Scalar("username".into())),
    )
    .expect("scalar projection");
    assert_eq!(plan.projection, Projection::Scalar("username".into()));
}

#[test]
fn entity_graph_names_must_be_relations() {
    let kind = compile_err(
        &MethodSignature::new("findByAge", ResultShape::List).entity_graph("orders"),
    );
    assert_eq!(
        kind,
        CompileErrorKind::UnknownRelation {
            name: "orders".into(),
        }
    );

    let plan = compile(&MethodSignature::new("findByAge", ResultShape::List).entity_graph("team"))
        .expect("known relation");
    assert_eq!(plan.entity_graph, vec!["team".to_string()]);
}

//
// Declared templates
//

#[test]
fn declared_template_binds_declared_parameters() {
    let plan = compile(
        &MethodSignature::new("findUser", ResultShape::List)
            .query("select m from Member m where m.username = :username and m.age = :age")
            .param("username")
            .param("age"),
    )
    .expect("declared plan");

    assert!(plan.is_declared());
    assert_eq!(plan.parameters, vec![slot("username", false), slot("age", false)]);
    assert_eq!(plan.filter(), None);
}

#[test]
fn declared_in_placeholder_is_a_collection_slot() {
    let plan = compile(
        &MethodSignature::new("findByNames", ResultShape::List)
            .query("select m from Member m where m.username in :names")
            .param("names"),
    )
    .expect("declared plan");

    assert_eq!(plan.parameters, vec![slot("names", true)]);
}

#[test]
fn unbound_placeholder_is_rejected() {
    let kind = compile_err(
        &MethodSignature::new("findUser", ResultShape::List)
            .query("select m from Member m where m.username = :name")
            .param("username"),
    );

    assert_eq!(
        kind,
        CompileErrorKind::UnboundPlaceholder {
            placeholder: "name".into(),
        }
    );
}

#[test]
fn unused_declared_parameter_is_rejected() {
    let kind = compile_err(
        &MethodSignature::new("findUser", ResultShape::List)
            .query("select m from Member m where m.username = :username")
            .param("username")
            .param("age"),
    );

    assert_eq!(kind, CompileErrorKind::UnusedParameter { name: "age".into() });
}

#[test]
fn duplicate_parameter_is_rejected() {
    let kind = compile_err(
        &MethodSignature::new("findUser", ResultShape::List)
            .query("select m from Member m where m.username = :username")
            .param("username")
            .param("username"),
    );

    assert_eq!(
        kind,
        CompileErrorKind::DuplicateParameter {
            name: "username".into(),
        }
    );
}

#[test]
fn queries_reject_mutation_templates() {
    let kind = compile_err(
        &MethodSignature::new("bump", ResultShape::List)
            .query("update Member m set m.age = m.age + 1"),
    );

    assert_eq!(
        kind,
        CompileErrorKind::StatementMismatch {
            expected: StatementKind::Select,
            found: StatementKind::Update,
        }
    );
    assert_eq!(
        compile_err(&MethodSignature::new("blank", ResultShape::List).query("   ")),
        CompileErrorKind::EmptyTemplate
    );
}

#[test]
fn count_template_placeholders_must_be_bound() {
    let kind = compile_err(
        &MethodSignature::new("findByAgeGreaterThan", ResultShape::Page)
            .count_query("select count(m) from Member m where m.age > :minimum"),
    );

    assert_eq!(
        kind,
        CompileErrorKind::UnboundPlaceholder {
            placeholder: "minimum".into(),
        }
    );

    let plan = compile(
        &MethodSignature::new("findByAgeGreaterThan", ResultShape::Page)
            .count_query("select count(m) from Member m where m.age > :age"),
    )
    .expect("count template");
    assert!(plan.count_query.is_some());
}

//
// Named queries
//

#[test]
fn named_query_takes_precedence_over_derivation() {
    let named = NamedQueries::new().with(
        "Member.findByUsername",
        "select m from Member m where m.username = :username",
    );
    let plan = compile_with(
        &PlanCache::new(),
        &named,
        &MethodSignature::new("findByUsername", ResultShape::List).param("username"),
    )
    .expect("named plan");

    assert!(plan.is_declared());
    assert_eq!(
        plan.template().map(|t| t.text()),
        Some("select m from Member m where m.username = :username")
    );
}

#[test]
fn explicit_template_beats_named_query() {
    let named = NamedQueries::new().with(
        "Member.findByUsername",
        "select m from Member m where m.username = :username",
    );
    let plan = compile_with(
        &PlanCache::new(),
        &named,
        &MethodSignature::new("findByUsername", ResultShape::List)
            .query("select m from Member m where lower(m.username) = :username")
            .param("username"),
    )
    .expect("explicit plan");

    assert_eq!(
        plan.template().map(|t| t.text()),
        Some("select m from Member m where lower(m.username) = :username")
    );
}

#[test]
fn named_queries_are_entity_scoped() {
    let named = NamedQueries::new().with(
        "Team.findByUsername",
        "select t from Team t where t.name = :username",
    );
    let plan = compile_with(
        &PlanCache::new(),
        &named,
        &MethodSignature::new("findByUsername", ResultShape::List),
    )
    .expect("derived plan");

    assert!(!plan.is_declared());
}

//
// Cache
//

#[test]
fn repeated_registration_hits_the_cache() {
    metrics_reset_all();
    let cache = PlanCache::new();
    let named = NamedQueries::new();
    let signature = MethodSignature::new("findByUsername", ResultShape::OptionalSingle);

    let first = compile_with(&cache, &named, &signature).expect("first");
    let second = compile_with(&cache, &named, &signature).expect("second");

    assert!(Arc::ptr_eq(&first, &second));
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));

    let report = metrics_report();
    assert_eq!(report.ops.plans_compiled, 1);
    assert_eq!(report.ops.plan_cache_hits, 1);
}

#[test]
fn equal_registrations_compile_to_equal_plans() {
    let signature = MethodSignature::new("findByAgeGreaterThan", ResultShape::Page);
    let a = compile(&signature).expect("a");
    let b = compile(&signature).expect("b");

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(*a, *b);
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[test]
fn shape_and_hints_change_the_fingerprint() {
    let cache = PlanCache::new();
    let named = NamedQueries::new();

    let list = compile_with(&cache, &named, &MethodSignature::new("findByAge", ResultShape::List))
        .expect("list");
    let page = compile_with(&cache, &named, &MethodSignature::new("findByAge", ResultShape::Page))
        .expect("page");
    let read_only = compile_with(
        &cache,
        &named,
        &MethodSignature::new("findByAge", ResultShape::List).read_only(),
    )
    .expect("read only");

    assert_ne!(list.fingerprint, page.fingerprint);
    assert_ne!(list.fingerprint, read_only.fingerprint);
    assert_eq!(cache.len(), 3);
}

#[test]
fn failed_compiles_are_not_cached() {
    let cache = PlanCache::new();
    let named = NamedQueries::new();
    let signature = MethodSignature::new("findByNickname", ResultShape::List);

    assert!(compile_with(&cache, &named, &signature).is_err());
    assert!(compile_with(&cache, &named, &signature).is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().hits, 0);
}

#[test]
fn unfiltered_plans_are_cached_by_name() {
    let model = member_model();
    let cache = PlanCache::new();
    let named = NamedQueries::new();
    let compiler = PredicateCompiler::new(&model, &cache, &named);

    let a = compiler.compile_unfiltered("findAll", QueryKind::Select, ResultShape::List);
    let b = compiler.compile_unfiltered("findAll", QueryKind::Select, ResultShape::List);
    let count = compiler.compile_unfiltered("countAll", QueryKind::Count, ResultShape::Single);

    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.filter().is_some_and(|f| f.is_empty()));
    assert_eq!(count.kind, QueryKind::Count);
    assert_eq!(cache.len(), 2);
}

#[test]
fn describe_summarizes_the_plan() {
    let plan = compile(&MethodSignature::new(
        "findByUsernameAndAgeGreaterThan",
        ResultShape::List,
    ))
    .expect("plan");

    assert_eq!(
        plan.describe(),
        "findByUsernameAndAgeGreaterThan on Member: kind=select, shape=list, projection=entity, \
         source=derived[username = :username AND age > :age], limit=none, lock=none"
    );
}

#[test]
fn same_entity_name_with_another_schema_compiles_separately() {
    let cache = PlanCache::new();
    let named = NamedQueries::new();
    let full = member_model();
    let slim = EntityModel::new("Member", "id").field("age");
    let keyed = EntityModel::new("Member", "memberId")
        .field("username")
        .field("age");
    let signature = MethodSignature::new("findByUsername", ResultShape::List);

    let plan = PredicateCompiler::new(&full, &cache, &named)
        .compile(&signature)
        .expect("full model plan");

    let err = PredicateCompiler::new(&slim, &cache, &named)
        .compile(&signature)
        .expect_err("slim model has no username");
    assert!(matches!(
        err,
        Error::Parse(ref e) if matches!(e.kind, ParseErrorKind::UnknownOperator { .. })
    ));

    let other = PredicateCompiler::new(&keyed, &cache, &named)
        .compile(&signature)
        .expect("keyed model plan");
    assert!(!Arc::ptr_eq(&plan, &other));
    assert_eq!(plan.primary_key, "id");
    assert_eq!(other.primary_key, "memberId");
    assert_ne!(plan.fingerprint, other.fingerprint);
    assert_eq!(cache.len(), 2);
}

//
// Concurrency
//

#[test]
fn concurrent_registrations_share_one_value_equal_plan() {
    let model = member_model();
    let cache = PlanCache::new();
    let named = NamedQueries::new();
    let store = seeded_store();
    let config = RepositoryConfig::default();
    let signature = MethodSignature::new("findByAgeGreaterThan", ResultShape::List);
    let (model, cache, named, store, config, signature) =
        (&model, &cache, &named, &store, &config, &signature);

    let outcomes: Vec<(Arc<QueryPlan>, QueryResult)> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(move || {
                    let plan = PredicateCompiler::new(model, cache, named)
                        .compile(signature)
                        .expect("plan compiles");
                    let result = QueryExecutor::new(store, config)
                        .execute(&plan, &Arguments::new().bind("age", 25), None)
                        .expect("query runs");

                    (plan, result)
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker finishes"))
            .collect()
    });

    assert_eq!(cache.len(), 1);
    let (first_plan, first_result) = &outcomes[0];
    assert_eq!(first_result.rows().len(), 3);
    for (plan, result) in &outcomes {
        assert_eq!(plan, first_plan);
        assert_eq!(result, first_result);
    }
}
