//! Shared in-crate fixtures: a Member/Team schema and a seeded `MemoryStore`.

use crate::{
    config::RepositoryConfig,
    db::{Repository, query::plan::PlanCache, store::MemoryStore},
    model::{EntityModel, RelationModel, Row},
    value::Value,
};
use std::sync::Arc;

pub(crate) fn member_model() -> EntityModel {
    EntityModel::new("Member", "id")
        .field("username")
        .field("age")
        .relation(RelationModel::many_to_one("team", "teamId", "Team", "id"))
}

pub(crate) fn team_model() -> EntityModel {
    EntityModel::new("Team", "id").field("name")
}

pub(crate) fn member(id: i64, username: &str, age: i64, team: Option<i64>) -> Row {
    Row::new()
        .with("id", id)
        .with("username", username)
        .with("age", age)
        .with("teamId", team.map_or(Value::Null, Value::from))
}

/// Members 1..=5 aged 10, 20, 30, 40, 50; the first two on team 1, the next
/// two on team 2, the last unassigned.
pub(crate) fn seed(store: &MemoryStore) {
    store
        .insert("Team", Row::new().with("id", 1).with("name", "teamA"))
        .expect("seed team");
    store
        .insert("Team", Row::new().with("id", 2).with("name", "teamB"))
        .expect("seed team");

    let teams = [Some(1), Some(1), Some(2), Some(2), None];
    for (i, team) in (1..=5).zip(teams) {
        store
            .insert("Member", member(i, &format!("member{i}"), i * 10, team))
            .expect("seed member");
    }
}

pub(crate) fn empty_store() -> MemoryStore {
    MemoryStore::new()
        .with_table(&member_model())
        .with_table(&team_model())
}

pub(crate) fn seeded_store() -> MemoryStore {
    let store = empty_store();
    seed(&store);
    store
}

pub(crate) fn member_repository(store: Arc<MemoryStore>) -> Repository {
    Repository::new(
        member_model(),
        store,
        Arc::new(PlanCache::new()),
        RepositoryConfig::default(),
    )
}
