//! In-memory credential store for tests and single-node demos.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CredentialStore, InsertOutcome, NewUser, SecurityQuestionAnswer, UserRecord};

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
    answers: Mutex<HashMap<Uuid, Vec<SecurityQuestionAnswer>>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed security-question answers for a user (test fixture).
    pub async fn set_answers(&self, user_id: Uuid, answers: Vec<SecurityQuestionAnswer>) {
        self.answers.lock().await.insert(user_id, answers);
    }

    /// Flip the active flag on a user (test fixture).
    pub async fn set_active(&self, user_id: Uuid, is_active: bool) {
        if let Some(user) = self.users.lock().await.get_mut(&user_id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let users = self.users.lock().await;
        Ok(users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<InsertOutcome> {
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Ok(InsertOutcome::DuplicateEmail);
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            org_unit_id: user.org_unit_id,
            is_active: true,
        };
        users.insert(record.id, record.clone());
        Ok(InsertOutcome::Created(record))
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn security_answers(&self, id: Uuid) -> Result<Vec<SecurityQuestionAnswer>> {
        let answers = self.answers.lock().await;
        Ok(answers
            .get(&id)
            .map(|list| {
                list.iter()
                    .filter(|answer| answer.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
