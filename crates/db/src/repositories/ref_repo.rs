//! Repository for the `item_refs` table.
//!
//! `latest` is only moved through [`RefRepo::compare_and_swap`]; the
//! conditional `UPDATE` takes the row lock, so two transactions swapping from
//! the same expected version cannot both succeed.

use folio_core::{ItemId, RefName, VersionId};
use sqlx::PgConnection;
use uuid::Uuid;

pub struct RefRepo;

impl RefRepo {
    pub async fn find(
        conn: &mut PgConnection,
        item_id: ItemId,
        name: RefName,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT version_id FROM item_refs WHERE item_id = $1 AND name = $2")
                .bind(item_id.as_uuid())
                .bind(name.as_str())
                .fetch_optional(conn)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Point `name` at `new` if it currently points at `expected` (`None`
    /// meaning the ref does not exist yet). Returns whether a row changed.
    pub async fn compare_and_swap(
        conn: &mut PgConnection,
        item_id: ItemId,
        name: RefName,
        expected: Option<VersionId>,
        new: VersionId,
    ) -> Result<bool, sqlx::Error> {
        let result = match expected {
            None => {
                sqlx::query(
                    "INSERT INTO item_refs (item_id, name, version_id)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (item_id, name) DO NOTHING",
                )
                .bind(item_id.as_uuid())
                .bind(name.as_str())
                .bind(new.as_uuid())
                .execute(conn)
                .await?
            }
            Some(expected) => {
                sqlx::query(
                    "UPDATE item_refs SET version_id = $3, updated_at = NOW()
                     WHERE item_id = $1 AND name = $2 AND version_id = $4",
                )
                .bind(item_id.as_uuid())
                .bind(name.as_str())
                .bind(new.as_uuid())
                .bind(expected.as_uuid())
                .execute(conn)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    /// Point `name` at `version` unconditionally.
    pub async fn set(
        conn: &mut PgConnection,
        item_id: ItemId,
        name: RefName,
        version: VersionId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO item_refs (item_id, name, version_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (item_id, name)
             DO UPDATE SET version_id = EXCLUDED.version_id, updated_at = NOW()",
        )
        .bind(item_id.as_uuid())
        .bind(name.as_str())
        .bind(version.as_uuid())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Returns `true` if the ref existed.
    pub async fn clear(
        conn: &mut PgConnection,
        item_id: ItemId,
        name: RefName,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM item_refs WHERE item_id = $1 AND name = $2")
            .bind(item_id.as_uuid())
            .bind(name.as_str())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
