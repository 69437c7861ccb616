//! Version store behaviour: create/get round trip, version chains,
//! optimistic concurrency and field validation.

mod common;

use assert_matches::assert_matches;
use common::Fixture;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::{
    ContentStore, CoreError, DiffStatus, FieldInput, FieldType, InMemoryRepository,
    InMemorySchemas, ModelId, NewItem, ProjectId, RefName, Repository, Schema, SchemaField,
    SchemaId, SchemaProvider, Value,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Article {
    store: ContentStore<InMemoryRepository, InMemorySchemas>,
    schema: Schema,
    title: folio_core::FieldId,
    views: folio_core::FieldId,
}

fn article_store() -> Article {
    let mut schema = Schema::new(ProjectId::new(), ModelId::new());
    let title = schema
        .add_field(SchemaField::new("title", FieldType::Text { max_length: Some(20) }).required())
        .unwrap();
    let views = schema
        .add_field(SchemaField::new(
            "views",
            FieldType::Integer {
                min: Some(0),
                max: None,
            },
        ))
        .unwrap();
    let schemas = InMemorySchemas::new();
    schemas.put(schema.clone());
    Article {
        store: ContentStore::new(InMemoryRepository::new(), schemas),
        schema,
        title,
        views,
    }
}

fn new_article(a: &Article, fields: Vec<FieldInput>) -> NewItem {
    NewItem {
        model_id: a.schema.model_id,
        schema_id: a.schema.id,
        fields,
    }
}

// ---------------------------------------------------------------------------
// Create / get
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_get_round_trips() {
    let a = article_store();
    let created = a
        .store
        .create_item(
            folio_core::Operator::System,
            new_article(&a, vec![FieldInput::new(a.title, json!("Hello"))]),
        )
        .await
        .unwrap();

    assert_eq!(created.version.number, 1);
    assert!(created.version.parents.is_empty());
    assert_eq!(created.refs.latest, created.version_id());
    assert_eq!(created.refs.public, None);

    let fetched = a.store.get_item(created.id(), RefName::Latest).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(
        fetched.version.field(a.title).and_then(|v| v.first()),
        Some(&Value::String("Hello".to_string()))
    );
}

#[tokio::test]
async fn old_versions_stay_readable_and_unchanged() {
    let a = article_store();
    let v1 = a
        .store
        .create_item(
            folio_core::Operator::System,
            new_article(&a, vec![FieldInput::new(a.title, json!("First"))]),
        )
        .await
        .unwrap();
    let v2 = a
        .store
        .update_item(
            folio_core::Operator::System,
            v1.id(),
            v1.version_id(),
            vec![FieldInput::new(a.views, json!(10))],
        )
        .await
        .unwrap();

    assert_eq!(v2.version.number, 2);
    assert!(v2.version.parents.contains(&v1.version_id()));
    // Untouched fields carry over.
    assert_eq!(
        v2.version.field(a.title).and_then(|v| v.first()),
        Some(&Value::String("First".to_string()))
    );

    let old = a.store.get_item(v1.id(), v1.version_id()).await.unwrap();
    assert_eq!(old.version, v1.version);
    assert_eq!(old.refs.latest, v2.version_id());

    let history = a.store.item_versions(v1.id()).await.unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn unpublished_item_has_no_public_version() {
    let f = Fixture::new();
    let y = f.create_y("draft").await;
    assert_matches!(
        f.store.get_item(y.id(), RefName::Public).await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn version_of_another_item_is_not_found() {
    let f = Fixture::new();
    let y1 = f.create_y("one").await;
    let y2 = f.create_y("two").await;
    assert_matches!(
        f.store.get_item(y1.id(), y2.version_id()).await,
        Err(CoreError::NotFound { entity: "Version", .. })
    );
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_rejects_invalid_fields() {
    let a = article_store();
    let op = folio_core::Operator::System;

    let missing_required = a.store.create_item(op, new_article(&a, vec![])).await;
    assert_matches!(missing_required, Err(CoreError::Validation(_)));

    let wrong_type = a
        .store
        .create_item(
            op,
            new_article(
                &a,
                vec![
                    FieldInput::new(a.title, json!("ok")),
                    FieldInput::new(a.views, json!("many")),
                ],
            ),
        )
        .await;
    assert_matches!(wrong_type, Err(CoreError::Validation(_)));

    let unknown = a
        .store
        .create_item(
            op,
            new_article(
                &a,
                vec![
                    FieldInput::new(a.title, json!("ok")),
                    FieldInput::new(folio_core::FieldId::new(), json!(1)),
                ],
            ),
        )
        .await;
    assert_matches!(unknown, Err(CoreError::Validation(_)));

    let other_model = a
        .store
        .create_item(
            op,
            NewItem {
                model_id: ModelId::new(),
                schema_id: a.schema.id,
                fields: vec![FieldInput::new(a.title, json!("ok"))],
            },
        )
        .await;
    assert_matches!(other_model, Err(CoreError::Validation(_)));
}

#[tokio::test]
async fn update_cannot_null_required_field() {
    let a = article_store();
    let op = folio_core::Operator::System;
    let created = a
        .store
        .create_item(op, new_article(&a, vec![FieldInput::new(a.title, json!("Keep"))]))
        .await
        .unwrap();

    let result = a
        .store
        .update_item(
            op,
            created.id(),
            created.version_id(),
            vec![FieldInput::new(a.title, json!(null))],
        )
        .await;
    assert_matches!(result, Err(CoreError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Optimistic concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_expected_version_conflicts_without_writing() {
    let f = Fixture::new();
    let y = f.create_y("v1").await;
    f.store
        .update_item(
            f.editor,
            y.id(),
            y.version_id(),
            vec![FieldInput::new(f.y_title, json!("v2"))],
        )
        .await
        .unwrap();

    let stale = f
        .store
        .update_item(
            f.editor,
            y.id(),
            y.version_id(),
            vec![FieldInput::new(f.y_title, json!("v3"))],
        )
        .await;

    assert_matches!(stale, Err(CoreError::Conflict(_)));
    assert_eq!(f.store.item_versions(y.id()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_updates_from_same_version_one_wins() {
    let f = Fixture::new();
    let y = f.create_y("base").await;

    let (left, right) = futures::join!(
        f.store.update_item(
            f.editor,
            y.id(),
            y.version_id(),
            vec![FieldInput::new(f.y_title, json!("left"))],
        ),
        f.store.update_item(
            f.editor,
            y.id(),
            y.version_id(),
            vec![FieldInput::new(f.y_title, json!("right"))],
        ),
    );

    let outcomes = [left, right];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
        .count();
    assert_eq!((wins, conflicts), (1, 1));
    assert_eq!(f.store.item_versions(y.id()).await.unwrap().len(), 2);
}

/// Schema provider that shares the store's repository, like a database
/// provider sharing the store's pool. Lookups fail if the store still holds
/// a transaction while asking for a schema.
#[derive(Clone)]
struct SharedRepoSchemas {
    repo: InMemoryRepository,
    inner: InMemorySchemas,
}

#[async_trait]
impl SchemaProvider for SharedRepoSchemas {
    async fn schema(&self, id: SchemaId) -> Result<Schema, CoreError> {
        match tokio::time::timeout(Duration::from_secs(1), self.repo.begin()).await {
            Ok(tx) => drop(tx?),
            Err(_) => {
                return Err(CoreError::Internal(
                    "schema lookup waited on an open transaction".to_string(),
                ))
            }
        }
        self.inner.schema(id).await
    }
}

#[tokio::test]
async fn schema_lookups_do_not_wait_on_open_transactions() {
    let f = Fixture::new();
    let repo = InMemoryRepository::new();
    let store = ContentStore::new(
        repo.clone(),
        SharedRepoSchemas {
            repo,
            inner: f.schemas.clone(),
        },
    );

    let y = store
        .create_item(
            f.editor,
            NewItem {
                model_id: f.y.model_id,
                schema_id: f.y.id,
                fields: vec![FieldInput::new(f.y_title, json!("one"))],
            },
        )
        .await
        .unwrap();
    let updated = store
        .update_item(
            f.editor,
            y.id(),
            y.version_id(),
            vec![FieldInput::new(f.y_title, json!("two"))],
        )
        .await
        .unwrap();
    assert_eq!(updated.version.number, 2);

    store.delete_item(f.editor, y.id()).await.unwrap();
    assert_matches!(
        store.get_item(y.id(), RefName::Latest).await,
        Err(CoreError::NotFound { .. })
    );
}

#[tokio::test]
async fn unchanged_update_writes_no_version() {
    let f = Fixture::new();
    let y = f.create_y("same").await;

    let again = f
        .store
        .update_item(
            f.editor,
            y.id(),
            y.version_id(),
            vec![FieldInput::new(f.y_title, json!("same"))],
        )
        .await
        .unwrap();

    assert_eq!(again.version_id(), y.version_id());
    assert_eq!(f.store.item_versions(y.id()).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Diffs and deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn diff_between_versions() {
    let a = article_store();
    let op = folio_core::Operator::System;
    let v1 = a
        .store
        .create_item(op, new_article(&a, vec![FieldInput::new(a.title, json!("One"))]))
        .await
        .unwrap();
    let v2 = a
        .store
        .update_item(
            op,
            v1.id(),
            v1.version_id(),
            vec![
                FieldInput::new(a.title, json!("Two")),
                FieldInput::new(a.views, json!(3)),
            ],
        )
        .await
        .unwrap();

    let diff = a
        .store
        .diff_versions(v1.id(), v1.version_id(), v2.version_id())
        .await
        .unwrap();
    let status_of = |field: folio_core::FieldId| diff.iter().find(|d| d.field_id == field).map(|d| d.status);
    assert_eq!(status_of(a.title), Some(DiffStatus::Changed));
    assert_eq!(status_of(a.views), Some(DiffStatus::Added));
}

#[tokio::test]
async fn deleted_item_is_gone() {
    let f = Fixture::new();
    let y = f.create_y("short lived").await;
    f.store.delete_item(f.editor, y.id()).await.unwrap();

    assert_matches!(
        f.store.item_versions(y.id()).await,
        Err(CoreError::NotFound { entity: "Item", .. })
    );
    assert_matches!(
        f.store.delete_item(f.editor, y.id()).await,
        Err(CoreError::NotFound { .. })
    );
}
