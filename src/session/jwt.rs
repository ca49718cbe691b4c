// src/session/jwt.rs

use async_trait::async_trait;
use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::CoreError,
    models::{Claims, Session},
    session::AuthGateway,
};

const SESSION_TTL: chrono::Duration = chrono::Duration::hours(1);

// Gateway de produção: credenciais em Postgres, sessão como JWT.
#[derive(Clone)]
pub struct JwtAuthGateway {
    pool: PgPool,
    jwt_secret: String,
}

impl JwtAuthGateway {
    pub fn new(pool: PgPool, jwt_secret: String) -> Self {
        Self { pool, jwt_secret }
    }

    fn create_session(&self, user_id: Uuid) -> Result<Session, CoreError> {
        let now = Utc::now();
        let expires_at = now + SESSION_TTL;

        let claims = Claims {
            sub: user_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?;
        Ok(Session { access_token: token, user_id, expires_at })
    }

    async fn hash_secret(secret: &str) -> Result<String, CoreError> {
        // Hashing fora do executor async, como manda o figurino.
        let secret = secret.to_owned();
        let hashed = tokio::task::spawn_blocking(move || hash(&secret, bcrypt::DEFAULT_COST))
            .await
            .map_err(|e| anyhow::anyhow!("falha na task de hashing: {}", e))??;
        Ok(hashed)
    }
}

#[async_trait]
impl AuthGateway for JwtAuthGateway {
    async fn register(&self, user_id: Uuid, login: &str, secret: &str) -> Result<(), CoreError> {
        let hashed = Self::hash_secret(secret).await?;
        sqlx::query(
            r#"
            INSERT INTO auth_credentials (user_id, login, password_hash)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(login)
        .bind(hashed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn authenticate(&self, login: &str, secret: &str) -> Result<Session, CoreError> {
        let row: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT user_id, password_hash FROM auth_credentials WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        // Credencial ausente e senha errada respondem igual: nada de
        // vazar quais logins existem.
        let (user_id, password_hash) = row.ok_or(CoreError::InvalidCredentials)?;

        let secret = secret.to_owned();
        let is_valid = tokio::task::spawn_blocking(move || verify(&secret, &password_hash))
            .await
            .map_err(|e| anyhow::anyhow!("falha na task de verificação de senha: {}", e))??;

        if !is_valid {
            return Err(CoreError::InvalidCredentials);
        }
        self.create_session(user_id)
    }

    async fn refresh(&self, session: &Session) -> Result<Session, CoreError> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(
            &session.access_token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )?;
        self.create_session(token_data.claims.sub)
    }

    async fn invalidate(&self, _session: &Session) -> Result<(), CoreError> {
        // JWT sem estado: nada a revogar do lado do servidor. O
        // teardown local do SessionManager é o que encerra a sessão.
        Ok(())
    }

    async fn set_secret(&self, user_id: Uuid, secret: &str) -> Result<(), CoreError> {
        let hashed = Self::hash_secret(secret).await?;
        let result = sqlx::query("UPDATE auth_credentials SET password_hash = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(hashed)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}
