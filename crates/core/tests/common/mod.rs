//! Shared fixture: two models `X` and `Y` in one project, linked by a
//! two-way reference pair `A` (on X) <-> `B` (on Y), plus a text field on
//! each schema.

#![allow(dead_code)]

use folio_core::schema::create_reference_pair;
use folio_core::{
    ContentStore, FieldId, FieldInput, FieldType, InMemoryRepository, InMemorySchemas, ItemId,
    ItemSnapshot, ModelId, NewItem, Operator, ProjectId, ReferenceFieldPair, Schema, SchemaField,
    UserId,
};
use serde_json::json;

pub type Store = ContentStore<InMemoryRepository, InMemorySchemas>;

pub struct Fixture {
    pub store: Store,
    pub schemas: InMemorySchemas,
    pub project: ProjectId,
    pub x: Schema,
    pub y: Schema,
    pub pair: ReferenceFieldPair,
    pub x_title: FieldId,
    pub y_title: FieldId,
    pub editor: Operator,
}

impl Fixture {
    pub fn new() -> Self {
        let project = ProjectId::new();
        let mut x = Schema::new(project, ModelId::new());
        let mut y = Schema::new(project, ModelId::new());

        let x_title = x
            .add_field(SchemaField::new("title", FieldType::Text { max_length: Some(200) }))
            .unwrap();
        let y_title = y
            .add_field(SchemaField::new("title", FieldType::Text { max_length: Some(200) }))
            .unwrap();
        let pair = create_reference_pair(&mut x, &mut y, "partner", "partner_of").unwrap();

        let schemas = InMemorySchemas::new();
        schemas.put(x.clone());
        schemas.put(y.clone());
        let store = ContentStore::new(InMemoryRepository::new(), schemas.clone());

        Self {
            store,
            schemas,
            project,
            x,
            y,
            pair,
            x_title,
            y_title,
            editor: Operator::User(UserId::new()),
        }
    }

    pub async fn create_x(&self, title: &str, a: Option<ItemId>) -> ItemSnapshot {
        let mut fields = vec![FieldInput::new(self.x_title, json!(title))];
        if let Some(target) = a {
            fields.push(reference_input(self.pair.field_a, Some(target)));
        }
        self.store
            .create_item(
                self.editor,
                NewItem {
                    model_id: self.x.model_id,
                    schema_id: self.x.id,
                    fields,
                },
            )
            .await
            .unwrap()
    }

    pub async fn create_y(&self, title: &str) -> ItemSnapshot {
        self.store
            .create_item(
                self.editor,
                NewItem {
                    model_id: self.y.model_id,
                    schema_id: self.y.id,
                    fields: vec![FieldInput::new(self.y_title, json!(title))],
                },
            )
            .await
            .unwrap()
    }

    /// Set `A` on an X item from its current latest version.
    pub async fn set_a(&self, item: ItemId, target: Option<ItemId>) -> ItemSnapshot {
        let current = self.latest(item).await;
        self.store
            .update_item(
                self.editor,
                item,
                current.version_id(),
                vec![reference_input(self.pair.field_a, target)],
            )
            .await
            .unwrap()
    }

    pub async fn latest(&self, item: ItemId) -> ItemSnapshot {
        self.store
            .get_item(item, folio_core::RefName::Latest)
            .await
            .unwrap()
    }

    pub async fn a_of(&self, item: ItemId) -> Option<ItemId> {
        self.latest(item).await.reference(self.pair.field_a)
    }

    pub async fn b_of(&self, item: ItemId) -> Option<ItemId> {
        self.latest(item).await.reference(self.pair.field_b)
    }

    /// Bidirectionality over the given items: `x.A == y` iff `y.B == x`.
    pub async fn assert_consistent(&self, xs: &[ItemId], ys: &[ItemId]) {
        for &x in xs {
            let a = self.a_of(x).await;
            for &y in ys {
                let b = self.b_of(y).await;
                assert_eq!(
                    a == Some(y),
                    b == Some(x),
                    "x {x} holds {a:?}, y {y} holds {b:?}"
                );
            }
        }
    }
}

/// A reference input; `None` clears the field with an empty string.
pub fn reference_input(field: FieldId, target: Option<ItemId>) -> FieldInput {
    match target {
        Some(id) => FieldInput::new(field, json!(id.to_string())),
        None => FieldInput::new(field, json!("")),
    }
}
