use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::entity::{EntityRole, EntityStatus, parse_filter},
    validators::{normalize_email, validate_not_blank},
};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;
pub const EMAIL_TAKEN: &str = "Email already exists";

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: EntityRole,
    pub status: EntityStatus,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityInput {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1-100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    pub role: EntityRole,
    #[serde(default)]
    pub status: EntityStatus,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub company: Option<String>,
    #[validate(url)]
    pub avatar: Option<String>,
}

/// Partial entity update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntityInput {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1-100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub role: Option<EntityRole>,
    pub status: Option<EntityStatus>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub company: Option<String>,
    #[validate(url)]
    pub avatar: Option<String>,
}

/// Raw list query as it arrives on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEntitiesQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validated list filter handed to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    pub search: Option<String>,
    pub status: Option<EntityStatus>,
    pub role: Option<EntityRole>,
    pub limit: i64,
    pub offset: i64,
}

impl EntityFilter {
    pub fn from_query(query: &ListEntitiesQuery) -> AppResult<Self> {
        let status = parse_filter::<EntityStatus>(query.status.as_deref())
            .map_err(AppError::validation)?;
        let role = parse_filter::<EntityRole>(query.role.as_deref()).map_err(AppError::validation)?;
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            search,
            status,
            role,
            limit: query
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
            offset: query.offset.unwrap_or(0).max(0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewEntity {
    pub name: String,
    pub email: String,
    pub role: EntityRole,
    pub status: EntityStatus,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub created_by: Uuid,
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait EntityRepo: Send + Sync {
    /// Newest first.
    async fn list(&self, filter: &EntityFilter) -> AppResult<Vec<EntityProfile>>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<EntityProfile>>;
    async fn get_by_email(&self, email: &str) -> AppResult<Option<EntityProfile>>;
    /// Fails with `Conflict` when the email is already stored.
    async fn create(&self, entity: &NewEntity) -> AppResult<EntityProfile>;
    /// Applies the present fields and bumps `updated_at`. `None` if the entity does not exist.
    async fn update(&self, id: Uuid, input: &UpdateEntityInput)
    -> AppResult<Option<EntityProfile>>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct EntityUseCases {
    repo: Arc<dyn EntityRepo>,
}

impl EntityUseCases {
    pub fn new(repo: Arc<dyn EntityRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &ListEntitiesQuery) -> AppResult<Vec<EntityProfile>> {
        let filter = EntityFilter::from_query(query)?;
        self.repo.list(&filter).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> AppResult<EntityProfile> {
        self.repo.get_by_id(id).await?.ok_or_else(entity_not_found)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(
        &self,
        created_by: Uuid,
        input: CreateEntityInput,
    ) -> AppResult<EntityProfile> {
        input.validate()?;
        let email = normalize_email(&input.email);

        if self.repo.get_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(EMAIL_TAKEN.into()));
        }

        let entity = self
            .repo
            .create(&NewEntity {
                name: input.name.trim().to_string(),
                email,
                role: input.role,
                status: input.status,
                avatar: input.avatar,
                phone: input.phone,
                company: input.company,
                created_by,
            })
            .await?;

        tracing::info!(entity_id = %entity.id, "Entity created");
        Ok(entity)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, mut input: UpdateEntityInput) -> AppResult<EntityProfile> {
        input.validate()?;

        let existing = self.repo.get_by_id(id).await?.ok_or_else(entity_not_found)?;

        if let Some(email) = input.email.as_mut() {
            *email = normalize_email(email);
            if *email != existing.email
                && let Some(owner) = self.repo.get_by_email(email).await?
                && owner.id != id
            {
                return Err(AppError::Conflict(EMAIL_TAKEN.into()));
            }
        }
        if let Some(name) = input.name.as_mut() {
            *name = name.trim().to_string();
        }

        self.repo
            .update(id, &input)
            .await?
            .ok_or_else(entity_not_found)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !self.repo.delete(id).await? {
            return Err(entity_not_found());
        }
        tracing::info!(entity_id = %id, "Entity deleted");
        Ok(())
    }
}

fn entity_not_found() -> AppError {
    AppError::not_found("Entity not found")
}
