//! Module repository

use sqlx::SqlitePool;

use gantry_core::domain::module::Module;

/// Find a script module by id
pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Module>, sqlx::Error> {
    let row = sqlx::query_as::<_, ModuleRow>(
        r#"
        SELECT id, name, body, params
        FROM modules
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: String,
    name: String,
    body: String,
    params: String,
}

impl From<ModuleRow> for Module {
    fn from(row: ModuleRow) -> Self {
        Module {
            id: row.id,
            name: row.name,
            body: row.body,
            params: serde_json::from_str(&row.params).unwrap_or_default(),
        }
    }
}
