#![allow(dead_code)]

use anyhow::bail;
use serde_json::{json, Value};
use std::sync::Arc;

use autocrud::{
    ColumnDef, ColumnType, Crud, Dialect, Entity, Record, Row, RowStore, SqliteStore, Statement,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE tier (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE category (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE test (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        tier_id INTEGER REFERENCES tier (id),
        category_id INTEGER REFERENCES category (id),
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        deleted_at TIMESTAMP,
        updated_at TIMESTAMP
    )",
    "CREATE TABLE booking (
        id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL REFERENCES test (id),
        user_id INTEGER NOT NULL REFERENCES test (id),
        booking_date TEXT NOT NULL
    )",
    "CREATE TABLE project (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE participant (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE projects_participants_association (
        project_id INTEGER NOT NULL REFERENCES project (id),
        participant_id INTEGER NOT NULL REFERENCES participant (id),
        PRIMARY KEY (project_id, participant_id)
    )",
    "CREATE TABLE card (id INTEGER PRIMARY KEY, title TEXT NOT NULL)",
    "CREATE TABLE article (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        card_id INTEGER REFERENCES card (id)
    )",
];

/// Names of the twelve seeded `test` rows, ids 1..=12
pub const TEST_NAMES: [&str; 12] = [
    "Charlie", "Alice", "Bob", "Alice", "Eve", "Bob", "Dave", "Frank", "Grace", "Heidi", "Ivan",
    "Judy",
];

pub fn tier() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "tier",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text).unique(),
            ],
        )
        .unwrap(),
    )
}

pub fn category() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "category",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
            ],
        )
        .unwrap(),
    )
}

pub fn test_entity() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "test",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::new("tier_id", ColumnType::Integer)
                    .nullable()
                    .references("tier", "id"),
                ColumnDef::new("category_id", ColumnType::Integer)
                    .nullable()
                    .references("category", "id"),
                ColumnDef::new("is_deleted", ColumnType::Boolean),
                ColumnDef::new("deleted_at", ColumnType::Timestamp).nullable(),
                ColumnDef::new("updated_at", ColumnType::Timestamp).nullable(),
            ],
        )
        .unwrap(),
    )
}

pub fn booking() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "booking",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("owner_id", ColumnType::Integer).references("test", "id"),
                ColumnDef::new("user_id", ColumnType::Integer).references("test", "id"),
                ColumnDef::new("booking_date", ColumnType::Text),
            ],
        )
        .unwrap(),
    )
}

pub fn project() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "project",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
            ],
        )
        .unwrap(),
    )
}

pub fn participant() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "participant",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
            ],
        )
        .unwrap(),
    )
}

pub fn association() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "projects_participants_association",
            vec![
                ColumnDef::new("project_id", ColumnType::Integer)
                    .primary_key()
                    .references("project", "id"),
                ColumnDef::new("participant_id", ColumnType::Integer)
                    .primary_key()
                    .references("participant", "id"),
            ],
        )
        .unwrap(),
    )
}

pub fn card() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "card",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("title", ColumnType::Text),
            ],
        )
        .unwrap(),
    )
}

pub fn article() -> Arc<Entity> {
    Arc::new(
        Entity::new(
            "article",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("card_id", ColumnType::Integer)
                    .nullable()
                    .references("card", "id"),
            ],
        )
        .unwrap(),
    )
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

async fn insert_all(store: &SqliteStore, entity: Arc<Entity>, rows: Vec<Value>) {
    let crud = Crud::new(entity);
    for row in rows {
        crud.create(store, record(row)).await.unwrap();
    }
}

/// Empty database with every test table created
pub async fn empty_store() -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    for ddl in SCHEMA {
        store.execute(&Statement::raw(*ddl)).await.unwrap();
    }
    store
}

/// Database with the standard fixture rows.
///
/// Tiers: Premium (1), Basic (2). Odd `test` ids are Premium, even ids
/// Basic; ids 1..=6 are in category 1, the rest in category 2.
/// Card 1 has three articles, card 2 none.
pub async fn seeded_store() -> SqliteStore {
    let store = empty_store().await;

    insert_all(
        &store,
        tier(),
        vec![json!({"id": 1, "name": "Premium"}), json!({"id": 2, "name": "Basic"})],
    )
    .await;
    insert_all(
        &store,
        category(),
        vec![json!({"id": 1, "name": "Books"}), json!({"id": 2, "name": "Music"})],
    )
    .await;

    let tests = TEST_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let id = i as i64 + 1;
            json!({
                "id": id,
                "name": name,
                "tier_id": if id % 2 == 1 { 1 } else { 2 },
                "category_id": if id <= 6 { 1 } else { 2 },
            })
        })
        .collect();
    insert_all(&store, test_entity(), tests).await;

    insert_all(
        &store,
        booking(),
        vec![
            json!({"id": 1, "owner_id": 1, "user_id": 2, "booking_date": "2024-03-01"}),
            json!({"id": 2, "owner_id": 3, "user_id": 1, "booking_date": "2024-03-02"}),
        ],
    )
    .await;

    insert_all(
        &store,
        project(),
        vec![json!({"id": 1, "name": "Apollo"}), json!({"id": 2, "name": "Gemini"})],
    )
    .await;
    insert_all(
        &store,
        participant(),
        vec![json!({"id": 1, "name": "Ada"}), json!({"id": 2, "name": "Linus"})],
    )
    .await;
    insert_all(
        &store,
        association(),
        vec![
            json!({"project_id": 1, "participant_id": 1}),
            json!({"project_id": 1, "participant_id": 2}),
            json!({"project_id": 2, "participant_id": 1}),
        ],
    )
    .await;

    insert_all(
        &store,
        card(),
        vec![json!({"id": 1, "title": "Card A"}), json!({"id": 2, "title": "Card B"})],
    )
    .await;
    insert_all(
        &store,
        article(),
        vec![
            json!({"id": 1, "title": "First", "card_id": 1}),
            json!({"id": 2, "title": "Second", "card_id": 1}),
            json!({"id": 3, "title": "Third", "card_id": 1}),
        ],
    )
    .await;

    store
}

/// Store that fails every call, for checks that must happen before storage access
pub struct UnreachableStore;

#[async_trait::async_trait]
impl RowStore for UnreachableStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch_all(&self, statement: &Statement) -> anyhow::Result<Vec<Row>> {
        bail!("storage reached with: {}", statement.sql)
    }

    async fn fetch_count(&self, statement: &Statement) -> anyhow::Result<u64> {
        bail!("storage reached with: {}", statement.sql)
    }

    async fn execute(&self, statement: &Statement) -> anyhow::Result<u64> {
        bail!("storage reached with: {}", statement.sql)
    }
}
