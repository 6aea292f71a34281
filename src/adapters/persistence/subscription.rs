use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::{
        SubscriptionProfile, SubscriptionRepo, SubscriptionStatusUpdate, SubscriptionSync,
        free_subscription,
    },
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> SubscriptionProfile {
    SubscriptionProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_name: row.get("plan_name"),
        plan_price: row.get("plan_price"),
        billing_cycle: row.get("billing_cycle"),
        status: row.get("status"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        stripe_customer_id: row.get("stripe_customer_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, plan_name, plan_price, billing_cycle, status,
    current_period_start, current_period_end, cancel_at_period_end,
    stripe_customer_id, stripe_subscription_id, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_user_id(&self, user_id: Uuid) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn get_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(stripe_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }

    async fn attach_customer(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriptionProfile> {
        let free = free_subscription(user_id, stripe_customer_id, now);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_name, plan_price, billing_cycle, status,
                current_period_start, current_period_end, cancel_at_period_end,
                stripe_customer_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(free.id)
        .bind(free.user_id)
        .bind(&free.plan_name)
        .bind(free.plan_price)
        .bind(free.billing_cycle)
        .bind(free.status)
        .bind(free.current_period_start)
        .bind(free.current_period_end)
        .bind(free.cancel_at_period_end)
        .bind(&free.stripe_customer_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(&row))
    }

    async fn upsert_for_user(
        &self,
        user_id: Uuid,
        sync: &SubscriptionSync,
    ) -> AppResult<SubscriptionProfile> {
        // A missing customer id must not wipe the one stored at checkout.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_name, plan_price, billing_cycle, status,
                current_period_start, current_period_end, cancel_at_period_end,
                stripe_customer_id, stripe_subscription_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_name = EXCLUDED.plan_name,
                plan_price = EXCLUDED.plan_price,
                billing_cycle = EXCLUDED.billing_cycle,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                updated_at = NOW()
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&sync.plan_name)
        .bind(sync.plan_price)
        .bind(sync.billing_cycle)
        .bind(sync.status)
        .bind(sync.current_period_start)
        .bind(sync.current_period_end)
        .bind(sync.cancel_at_period_end)
        .bind(&sync.stripe_customer_id)
        .bind(&sync.stripe_subscription_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(&row))
    }

    async fn update_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionStatusUpdate,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = COALESCE($2, status),
                current_period_start = COALESCE($3, current_period_start),
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = COALESCE($5, cancel_at_period_end),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .bind(update.status)
        .bind(update.current_period_start)
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel_at_period_end: bool,
    ) -> AppResult<Option<SubscriptionProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions SET cancel_at_period_end = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(cancel_at_period_end)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_profile))
    }
}
