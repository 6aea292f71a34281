use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::user::{UpdateProfileInput, UserProfile, UserRepo},
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        image: row.get("image"),
        phone: row.get("phone"),
        company: row.get("company"),
        location: row.get("location"),
        theme: row.get("theme"),
        language: row.get("language"),
        timezone: row.get("timezone"),
        email_notifications: row.get("email_notifications"),
        push_notifications: row.get("push_notifications"),
        security_alerts: row.get("security_alerts"),
        marketing_emails: row.get("marketing_emails"),
        weekly_reports: row.get("weekly_reports"),
        billing_updates: row.get("billing_updates"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, name, email, image, phone, company, location, theme, language, timezone,
    email_notifications, push_notifications, security_alerts, marketing_emails,
    weekly_reports, billing_updates, created_at, updated_at
"#;

#[async_trait]
impl UserRepo for PostgresPersistence {
    async fn get_profile_by_id(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", SELECT_COLS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        input: &UpdateProfileInput,
    ) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                company = COALESCE($4, company),
                location = COALESCE($5, location),
                theme = COALESCE($6, theme),
                language = COALESCE($7, language),
                timezone = COALESCE($8, timezone),
                email_notifications = COALESCE($9, email_notifications),
                push_notifications = COALESCE($10, push_notifications),
                security_alerts = COALESCE($11, security_alerts),
                marketing_emails = COALESCE($12, marketing_emails),
                weekly_reports = COALESCE($13, weekly_reports),
                billing_updates = COALESCE($14, billing_updates),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.location)
        .bind(&input.theme)
        .bind(&input.language)
        .bind(&input.timezone)
        .bind(input.email_notifications)
        .bind(input.push_notifications)
        .bind(input.security_alerts)
        .bind(input.marketing_emails)
        .bind(input.weekly_reports)
        .bind(input.billing_updates)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }
}
