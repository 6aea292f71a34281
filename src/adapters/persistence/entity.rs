use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::entity::{
        EntityFilter, EntityProfile, EntityRepo, NewEntity, UpdateEntityInput,
    },
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> EntityProfile {
    EntityProfile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get("role"),
        status: row.get("status"),
        avatar: row.get("avatar"),
        phone: row.get("phone"),
        company: row.get("company"),
        last_login: row.get("last_login"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: row.get("created_by"),
    }
}

const SELECT_COLS: &str = r#"
    id, name, email, role, status, avatar, phone, company, last_login,
    created_at, updated_at, created_by
"#;

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl EntityRepo for PostgresPersistence {
    async fn list(&self, filter: &EntityFilter) -> AppResult<Vec<EntityProfile>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM entities WHERE TRUE", SELECT_COLS));

        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_profile).collect())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<EntityProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM entities WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<EntityProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM entities WHERE email = $1",
            SELECT_COLS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn create(&self, entity: &NewEntity) -> AppResult<EntityProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO entities (id, name, email, role, status, avatar, phone, company, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(&entity.name)
        .bind(&entity.email)
        .bind(entity.role)
        .bind(entity.status)
        .bind(&entity.avatar)
        .bind(&entity.phone)
        .bind(&entity.company)
        .bind(entity.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(&row))
    }

    async fn update(
        &self,
        id: Uuid,
        input: &UpdateEntityInput,
    ) -> AppResult<Option<EntityProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE entities SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                status = COALESCE($5, status),
                avatar = COALESCE($6, avatar),
                phone = COALESCE($7, phone),
                company = COALESCE($8, company),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.role)
        .bind(input.status)
        .bind(&input.avatar)
        .bind(&input.phone)
        .bind(&input.company)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
