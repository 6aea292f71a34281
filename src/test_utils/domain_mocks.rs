//! In-memory mock implementations for the user and entity repository traits.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        entity::{EMAIL_TAKEN, EntityFilter, EntityProfile, EntityRepo, NewEntity, UpdateEntityInput},
        user::{UpdateProfileInput, UserProfile, UserRepo},
    },
};

// ============================================================================
// InMemoryUserRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserRepo {
    pub users: Mutex<HashMap<Uuid, UserProfile>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<UserProfile>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    pub fn insert(&self, user: UserProfile) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.users.lock().unwrap().contains_key(&user_id)
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn get_profile_by_id(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        input: &UpdateProfileInput,
    ) -> AppResult<Option<UserProfile>> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(None);
        };

        if let Some(name) = &input.name {
            user.name = name.clone();
        }
        if input.phone.is_some() {
            user.phone = input.phone.clone();
        }
        if input.company.is_some() {
            user.company = input.company.clone();
        }
        if input.location.is_some() {
            user.location = input.location.clone();
        }
        if let Some(theme) = &input.theme {
            user.theme = theme.clone();
        }
        if let Some(language) = &input.language {
            user.language = language.clone();
        }
        if let Some(timezone) = &input.timezone {
            user.timezone = timezone.clone();
        }
        if let Some(v) = input.email_notifications {
            user.email_notifications = v;
        }
        if let Some(v) = input.push_notifications {
            user.push_notifications = v;
        }
        if let Some(v) = input.security_alerts {
            user.security_alerts = v;
        }
        if let Some(v) = input.marketing_emails {
            user.marketing_emails = v;
        }
        if let Some(v) = input.weekly_reports {
            user.weekly_reports = v;
        }
        if let Some(v) = input.billing_updates {
            user.billing_updates = v;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }
}

// ============================================================================
// InMemoryEntityRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryEntityRepo {
    pub entities: Mutex<HashMap<Uuid, EntityProfile>>,
}

impl InMemoryEntityRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: Vec<EntityProfile>) -> Self {
        Self {
            entities: Mutex::new(entities.into_iter().map(|e| (e.id, e)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.lock().unwrap().len()
    }
}

fn matches_filter(entity: &EntityProfile, filter: &EntityFilter) -> bool {
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        if !entity.name.to_lowercase().contains(&needle)
            && !entity.email.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    filter.status.is_none_or(|s| entity.status == s) && filter.role.is_none_or(|r| entity.role == r)
}

#[async_trait]
impl EntityRepo for InMemoryEntityRepo {
    async fn list(&self, filter: &EntityFilter) -> AppResult<Vec<EntityProfile>> {
        let mut found: Vec<EntityProfile> = self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| matches_filter(e, filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<EntityProfile>> {
        Ok(self.entities.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<EntityProfile>> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .find(|e| e.email == email)
            .cloned())
    }

    async fn create(&self, entity: &NewEntity) -> AppResult<EntityProfile> {
        let mut entities = self.entities.lock().unwrap();
        if entities.values().any(|e| e.email == entity.email) {
            return Err(AppError::Conflict(EMAIL_TAKEN.into()));
        }

        let now = Utc::now();
        let profile = EntityProfile {
            id: Uuid::new_v4(),
            name: entity.name.clone(),
            email: entity.email.clone(),
            role: entity.role,
            status: entity.status,
            avatar: entity.avatar.clone(),
            phone: entity.phone.clone(),
            company: entity.company.clone(),
            last_login: None,
            created_at: now,
            updated_at: now,
            created_by: Some(entity.created_by),
        };
        entities.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update(
        &self,
        id: Uuid,
        input: &UpdateEntityInput,
    ) -> AppResult<Option<EntityProfile>> {
        let mut entities = self.entities.lock().unwrap();
        if let Some(email) = &input.email
            && entities.values().any(|e| e.id != id && &e.email == email)
        {
            return Err(AppError::Conflict(EMAIL_TAKEN.into()));
        }
        let Some(entity) = entities.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = &input.name {
            entity.name = name.clone();
        }
        if let Some(email) = &input.email {
            entity.email = email.clone();
        }
        if let Some(role) = input.role {
            entity.role = role;
        }
        if let Some(status) = input.status {
            entity.status = status;
        }
        if input.avatar.is_some() {
            entity.avatar = input.avatar.clone();
        }
        if input.phone.is_some() {
            entity.phone = input.phone.clone();
        }
        if input.company.is_some() {
            entity.company = input.company.clone();
        }
        entity.updated_at = Utc::now();

        Ok(Some(entity.clone()))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.entities.lock().unwrap().remove(&id).is_some())
    }
}
