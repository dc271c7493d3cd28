//! Postgres-backed credential store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{CredentialStore, InsertOutcome, NewUser, SecurityQuestionAnswer, UserRecord};

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role: row.get("role"),
        org_unit_id: row.get("org_unit_id"),
        is_active: row.get("is_active"),
    }
}

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, role, org_unit_id, is_active";

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        Ok(row.map(|row| row_to_user(&row)))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        Ok(row.map(|row| row_to_user(&row)))
    }

    async fn insert(&self, user: NewUser) -> Result<InsertOutcome> {
        let query = format!(
            r"
            INSERT INTO users
                (email, password_hash, first_name, last_name, role, org_unit_id, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING {USER_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.role)
            .bind(user.org_unit_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(InsertOutcome::Created(row_to_user(&row))),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::DuplicateEmail),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        Ok(())
    }

    async fn security_answers(&self, id: Uuid) -> Result<Vec<SecurityQuestionAnswer>> {
        let query = r"
            SELECT user_id, question_id, answer_hash, is_active
            FROM security_question_answers
            WHERE user_id = $1
              AND is_active = TRUE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch security answers")?;

        Ok(rows
            .iter()
            .map(|row| SecurityQuestionAnswer {
                user_id: row.get("user_id"),
                question_id: row.get("question_id"),
                answer_hash: row.get("answer_hash"),
                is_active: row.get("is_active"),
            })
            .collect())
    }
}
