use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::{NewPayment, PaymentProfile, PaymentRepo},
};

fn row_to_profile(row: &sqlx::postgres::PgRow) -> PaymentProfile {
    PaymentProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        stripe_invoice_id: row.get("stripe_invoice_id"),
        stripe_payment_intent_id: row.get("stripe_payment_intent_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: row.get("status"),
        invoice_url: row.get("invoice_url"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, stripe_subscription_id, stripe_invoice_id, stripe_payment_intent_id,
    amount, currency, status, invoice_url, created_at
"#;

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn insert_if_absent(&self, payment: &NewPayment) -> AppResult<bool> {
        // Redelivered events hit the unique invoice / payment-intent indexes.
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, stripe_subscription_id, stripe_invoice_id, stripe_payment_intent_id,
                amount, currency, status, invoice_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment.user_id)
        .bind(&payment.stripe_subscription_id)
        .bind(&payment.stripe_invoice_id)
        .bind(&payment.stripe_payment_intent_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.invoice_url)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PaymentProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_profile).collect())
    }
}
