mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use autocrud::{
    ColumnRef, Crud, FieldDef, FieldKind, JoinKind, JoinSpec, ModelSchema, QueryRequest, Schema,
    SingleJoin,
};
use common::*;

#[tokio::test]
async fn test_single_join_detects_foreign_key() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let item = crud
        .get_joined(
            &store,
            QueryRequest::new()
                .join(SingleJoin::new(tier()).prefix("tier_"))
                .filter("id", 2),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["name"], json!("Alice"));
    assert_eq!(item["tier_name"], json!("Basic"));
}

#[tokio::test]
async fn test_single_join_detects_reverse_foreign_key() {
    let store = seeded_store().await;
    let crud = Crud::new(card());

    let item = crud
        .get_joined(
            &store,
            QueryRequest::new()
                .join(
                    SingleJoin::new(article())
                        .prefix("article_")
                        .kind(JoinKind::Inner),
                )
                .filter("id", 1),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["title"], json!("Card A"));
    assert_eq!(item["article_card_id"], json!(1));
}

#[tokio::test]
async fn test_single_join_without_relationship() {
    let crud = Crud::new(card());
    let err = crud
        .get_joined(
            &UnreachableStore,
            QueryRequest::new().join(SingleJoin::new(tier())),
        )
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Could not automatically determine a join condition"));
}

#[tokio::test]
async fn test_missing_row_is_none() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let item = crud
        .get_joined(
            &store,
            QueryRequest::new()
                .join(SingleJoin::new(tier()).prefix("tier_"))
                .filter("id", 999),
        )
        .await
        .unwrap();
    assert!(item.is_none());
}

#[tokio::test]
async fn test_single_row_carries_all_children() {
    let store = seeded_store().await;
    let crud = Crud::new(card());
    let join = JoinSpec::new(
        article(),
        ColumnRef::new("card", "id").equals(ColumnRef::new("article", "card_id")),
    )
    .prefix("articles_")
    .one_to_many();

    let item = crud
        .get_joined(
            &store,
            QueryRequest::new()
                .joins(vec![join])
                .nest()
                .filter("id", 1),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        Value::Object(item),
        json!({
            "id": 1,
            "title": "Card A",
            "articles": [
                {"id": 1, "title": "First", "card_id": 1},
                {"id": 2, "title": "Second", "card_id": 1},
                {"id": 3, "title": "Third", "card_id": 1}
            ]
        })
    );
}

#[tokio::test]
async fn test_nested_one_to_one_without_match_is_null() {
    let store = seeded_store().await;
    Crud::new(test_entity())
        .create(
            &store,
            record(json!({"id": 13, "name": "Mallory", "tier_id": null})),
        )
        .await
        .unwrap();

    let crud = Crud::new(test_entity());
    let item = crud
        .get_joined(
            &store,
            QueryRequest::new()
                .join(SingleJoin::new(tier()).prefix("tier_"))
                .nest()
                .filter("id", 13),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["name"], json!("Mallory"));
    assert_eq!(item["tier"], Value::Null);
}

#[tokio::test]
async fn test_two_joins_nested() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());
    let category_name: Arc<dyn Schema> =
        Arc::new(ModelSchema::new("CategorySchema").field(FieldDef::new("name", FieldKind::String)));
    let joins = vec![
        JoinSpec::new(
            tier(),
            ColumnRef::new("test", "tier_id").equals(ColumnRef::new("tier", "id")),
        )
        .prefix("tier_"),
        JoinSpec::new(
            category(),
            ColumnRef::new("test", "category_id").equals(ColumnRef::new("category", "id")),
        )
        .prefix("category_")
        .schema(category_name),
    ];

    let item = crud
        .get_joined(
            &store,
            QueryRequest::new().joins(joins).nest().filter("id", 7),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["name"], json!("Dave"));
    assert_eq!(item["tier"], json!({"id": 1, "name": "Premium"}));
    assert_eq!(item["category"], json!({"name": "Music"}));
}

#[tokio::test]
async fn test_unknown_join_condition_column() {
    let crud = Crud::new(test_entity());
    let join = JoinSpec::new(
        tier(),
        ColumnRef::new("test", "tier_id").equals(ColumnRef::new("tier", "level")),
    );
    let err = crud
        .get_joined(&UnreachableStore, QueryRequest::new().joins(vec![join]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unknown column reference 'tier.level' in join condition"
    );
}

#[tokio::test]
async fn test_nested_keys_colliding_after_trim_are_rejected() {
    let crud = Crud::new(test_entity());
    let joins = vec![
        JoinSpec::new(
            tier(),
            ColumnRef::new("test", "tier_id").equals(ColumnRef::new("tier", "id")),
        )
        .prefix("tier_"),
        JoinSpec::new(
            category(),
            ColumnRef::new("test", "category_id").equals(ColumnRef::new("category", "id")),
        )
        .prefix("tier__"),
    ];
    let err = crud
        .get_joined(
            &UnreachableStore,
            QueryRequest::new().joins(joins).nest().filter("id", 1),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Joins 'tier' and 'category' both nest under 'tier'"
    );
}
