use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_error::{AppError, AppResult},
    validators::{validate_not_blank, validate_theme},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub theme: String,
    pub language: String,
    pub timezone: String,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub security_alerts: bool,
    pub marketing_emails: bool,
    pub weekly_reports: bool,
    pub billing_updates: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1-100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub company: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    #[validate(custom(function = "validate_theme"))]
    pub theme: Option<String>,
    #[validate(length(min = 2, max = 10))]
    pub language: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub security_alerts: Option<bool>,
    pub marketing_emails: Option<bool>,
    pub weekly_reports: Option<bool>,
    pub billing_updates: Option<bool>,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_profile_by_id(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;
    /// Applies the present fields and bumps `updated_at`. `None` if the user does not exist.
    async fn update_profile(
        &self,
        user_id: Uuid,
        input: &UpdateProfileInput,
    ) -> AppResult<Option<UserProfile>>;
}

#[derive(Clone)]
pub struct UserUseCases {
    repo: Arc<dyn UserRepo>,
}

impl UserUseCases {
    pub fn new(repo: Arc<dyn UserRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        self.repo
            .get_profile_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        mut input: UpdateProfileInput,
    ) -> AppResult<UserProfile> {
        input.validate()?;
        if let Some(name) = input.name.as_mut() {
            *name = name.trim().to_string();
        }

        self.repo
            .update_profile(user_id, &input)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }
}
