mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use autocrud::{
    Crud, CrudError, FieldDef, FieldKind, Filters, ModelSchema, QueryRequest, Schema, SortOrder,
};
use common::*;

fn by_id(id: i64) -> Filters {
    Filters::new().with("id", id)
}

#[tokio::test]
async fn test_create_returns_stored_row() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let created = crud
        .create(&store, record(json!({"name": "Oscar", "tier_id": 2})))
        .await
        .unwrap();
    assert_eq!(created["id"], json!(13));
    assert_eq!(created["name"], json!("Oscar"));
    assert_eq!(created["is_deleted"], json!(false));
    assert_eq!(created["deleted_at"], Value::Null);
}

#[tokio::test]
async fn test_create_rejects_unknown_columns() {
    let crud = Crud::new(test_entity());
    let err = crud
        .create(
            &UnreachableStore,
            record(json!({"name": "Oscar", "colour": "red", "size": 3})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::Config(_)));
    assert_eq!(err.to_string(), "Extra fields provided: colour, size");
}

#[tokio::test]
async fn test_get_and_get_multi() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let item = crud
        .get(&store, QueryRequest::new().filter("id", 3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["name"], json!("Bob"));

    let missing = crud
        .get(&store, QueryRequest::new().filter("id", 99))
        .await
        .unwrap();
    assert!(missing.is_none());

    let schema: Arc<dyn Schema> = Arc::new(
        ModelSchema::new("ReadSchemaTest")
            .field(FieldDef::new("id", FieldKind::Integer))
            .field(FieldDef::new("name", FieldKind::String)),
    );
    let page = crud
        .get_multi(
            &store,
            QueryRequest::new()
                .schema(schema)
                .filter("tier_id", 1)
                .sort("id", SortOrder::Desc)
                .limit(2),
        )
        .await
        .unwrap();
    assert_eq!(page.total_count, 6);
    assert_eq!(
        Value::Array(page.data.into_iter().map(Value::Object).collect()),
        json!([{"id": 11, "name": "Ivan"}, {"id": 9, "name": "Grace"}])
    );
}

#[tokio::test]
async fn test_get_multi_without_limit_returns_everything() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let page = crud
        .get_multi(&store, QueryRequest::new().offset(10))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total_count, 12);
}

#[tokio::test]
async fn test_count_and_exists() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    assert_eq!(crud.count(&store, &Filters::new()).await.unwrap(), 12);
    assert_eq!(
        crud.count(&store, &Filters::new().with("category_id", 2))
            .await
            .unwrap(),
        6
    );
    assert!(crud
        .exists(&store, &Filters::new().with("name", "Judy"))
        .await
        .unwrap());
    assert!(!crud
        .exists(&store, &Filters::new().with("name", "Zed"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_update_single_row() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let changed = crud
        .update(&store, record(json!({"name": "Carla"})), &by_id(1), false)
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let item = crud
        .get(&store, QueryRequest::new().filters(by_id(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["name"], json!("Carla"));
    assert!(item["updated_at"].is_string());
}

#[tokio::test]
async fn test_update_match_count_rules() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let err = crud
        .update(&store, record(json!({"name": "Nobody"})), &by_id(99), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::NotFound(_)));
    assert_eq!(err.to_string(), "No record found to update.");

    let premium = Filters::new().with("tier_id", 1);
    let err = crud
        .update(&store, record(json!({"category_id": 2})), &premium, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::MultipleResults(_)));
    assert_eq!(
        err.to_string(),
        "Expected exactly one record to update, found 6."
    );

    let changed = crud
        .update(&store, record(json!({"category_id": 2})), &premium, true)
        .await
        .unwrap();
    assert_eq!(changed, 6);
}

#[tokio::test]
async fn test_delete_is_soft_when_supported() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    crud.delete(&store, &by_id(4), false).await.unwrap();

    let item = crud
        .get(&store, QueryRequest::new().filters(by_id(4)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item["is_deleted"], json!(true));
    assert!(item["deleted_at"].is_string());
    assert_eq!(
        crud.count(&store, &Filters::new().with("is_deleted", false))
            .await
            .unwrap(),
        11
    );
}

#[tokio::test]
async fn test_delete_is_hard_without_flag_column() {
    let store = seeded_store().await;
    let crud = Crud::new(tier());
    crud.create(&store, record(json!({"id": 3, "name": "Trial"})))
        .await
        .unwrap();

    crud.delete(&store, &by_id(3), false).await.unwrap();
    assert!(!crud.exists(&store, &by_id(3)).await.unwrap());

    let err = crud.delete(&store, &by_id(3), false).await.unwrap_err();
    assert_eq!(err.to_string(), "No record found to delete.");
}

#[tokio::test]
async fn test_db_delete_removes_rows() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let removed = crud.db_delete(&store, &by_id(12), false).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(crud.count(&store, &Filters::new()).await.unwrap(), 11);

    let err = crud
        .db_delete(&store, &Filters::new().with("category_id", 1), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CrudError::MultipleResults(_)));
}

#[tokio::test]
async fn test_upsert_inserts_then_updates() {
    let store = seeded_store().await;
    let crud = Crud::new(tier());

    let inserted = crud
        .upsert(&store, record(json!({"id": 3, "name": "Silver"})))
        .await
        .unwrap();
    assert_eq!(Value::Object(inserted), json!({"id": 3, "name": "Silver"}));

    let updated = crud
        .upsert(&store, record(json!({"id": 1, "name": "Gold"})))
        .await
        .unwrap();
    assert_eq!(Value::Object(updated), json!({"id": 1, "name": "Gold"}));

    let unchanged = crud
        .upsert(&store, record(json!({"id": 2})))
        .await
        .unwrap();
    assert_eq!(Value::Object(unchanged), json!({"id": 2, "name": "Basic"}));

    let err = crud
        .upsert(&store, record(json!({"name": "Bronze"})))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Upsert requires the primary key column 'id'");
}

#[tokio::test]
async fn test_cursor_pages_ascending() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());
    let ids = |page: &autocrud::CursorPage| -> Vec<i64> {
        page.data.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    };

    let first = crud
        .get_multi_by_cursor(&store, None, 5, "id", SortOrder::Asc, Filters::new())
        .await
        .unwrap();
    assert_eq!(ids(&first), vec![1, 2, 3, 4, 5]);
    assert_eq!(first.next_cursor, Some(json!(5)));

    let second = crud
        .get_multi_by_cursor(&store, first.next_cursor, 5, "id", SortOrder::Asc, Filters::new())
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![6, 7, 8, 9, 10]);

    let last = crud
        .get_multi_by_cursor(&store, second.next_cursor, 5, "id", SortOrder::Asc, Filters::new())
        .await
        .unwrap();
    assert_eq!(ids(&last), vec![11, 12]);
    assert_eq!(last.next_cursor, None);
}

#[tokio::test]
async fn test_cursor_pages_descending_with_filters() {
    let store = seeded_store().await;
    let crud = Crud::new(test_entity());

    let page = crud
        .get_multi_by_cursor(
            &store,
            Some(json!(9)),
            2,
            "id",
            SortOrder::Desc,
            Filters::new().with("tier_id", 1),
        )
        .await
        .unwrap();
    let ids: Vec<i64> = page.data.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![7, 5]);
    assert_eq!(page.next_cursor, Some(json!(5)));

    let empty = crud
        .get_multi_by_cursor(&store, None, 0, "id", SortOrder::Asc, Filters::new())
        .await
        .unwrap();
    assert!(empty.data.is_empty());
    assert_eq!(empty.next_cursor, None);
}
