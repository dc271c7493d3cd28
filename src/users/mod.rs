//! Credential store collaborator: user records, security-question
//! answers, and password hashing.
//!
//! The auth core consumes the store through the [`CredentialStore`] trait;
//! the Postgres implementation is the production backend and the in-memory
//! one serves tests and single-node demos.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

mod memory;
pub mod password;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub org_unit_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub org_unit_id: Option<Uuid>,
}

/// Answers are stored hashed and compared hash-only; plaintext answers
/// never persist. A user keeps 1–3 active answers with unique question ids.
#[derive(Debug, Clone)]
pub struct SecurityQuestionAnswer {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub answer_hash: String,
    pub is_active: bool,
}

/// Outcome of inserting a new user.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(UserRecord),
    DuplicateEmail,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;

    async fn insert(&self, user: NewUser) -> Result<InsertOutcome>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Active security-question answers for `id`, hash-compare only.
    async fn security_answers(&self, id: Uuid) -> Result<Vec<SecurityQuestionAnswer>>;
}
