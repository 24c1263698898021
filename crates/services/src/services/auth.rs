//! Registration, login and cookie-session authentication.

use chrono::{DateTime, Duration, Utc};
use db::models::{
    session::{NewSession, Session},
    user::{NewUser, User, UserRole},
};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use utils::tokens::{generate_token, hash_token};

use super::{
    ServiceContext,
    error::ServiceError,
    events::EventKind,
    password::PasswordHasher,
    validation::{USER_NAME_MAX, Validator},
};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("name", &self.name, USER_NAME_MAX)
            .email("email", &self.email)
            .password("password", &self.password);
        v.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: User,
    /// Plain session token; only its hash is stored.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn invalid_credentials() -> ServiceError {
    ServiceError::unauthorized("INVALID_CREDENTIALS", "Неверный email или пароль")
}

fn session_invalid() -> ServiceError {
    ServiceError::unauthorized(
        "SESSION_INVALID",
        "Сессия недействительна. Пожалуйста, войдите снова",
    )
}

pub(crate) fn email_exists() -> ServiceError {
    ServiceError::conflict("EMAIL_EXISTS", "Пользователь с таким email уже существует")
}

#[derive(Clone)]
pub struct AuthService {
    ctx: ServiceContext,
    hasher: PasswordHasher,
    session_ttl: Duration,
    require_approval: bool,
}

impl AuthService {
    pub fn new(
        ctx: ServiceContext,
        hasher: PasswordHasher,
        session_ttl: Duration,
        require_approval: bool,
    ) -> Self {
        Self {
            ctx,
            hasher,
            session_ttl,
            require_approval,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[instrument(name = "auth.register", skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<User, ServiceError> {
        req.validate()?;
        let email = normalize_email(&req.email);
        let users = &self.ctx.stores.users;

        if users.find_by_email(&email).await?.is_some() {
            return Err(email_exists());
        }

        let first_user = users.count().await? == 0;
        let password_hash = self
            .hasher
            .hash(&req.password)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let user = users
            .create(NewUser {
                email,
                name: req.name.trim().to_string(),
                password_hash,
                role: if first_user {
                    UserRole::Admin
                } else {
                    UserRole::User
                },
                is_approved: first_user || !self.require_approval,
            })
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict { .. } => email_exists(),
                other => other,
            })?;

        info!(user_id = %user.id, admin = first_user, "user registered");
        self.ctx
            .events
            .emit(EventKind::UserRegistered, None, user.id, user.id);
        Ok(user)
    }

    #[instrument(name = "auth.login", skip_all)]
    pub async fn login(
        &self,
        req: LoginRequest,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<LoginResult, ServiceError> {
        let email = normalize_email(&req.email);
        let user = self
            .ctx
            .stores
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !self.hasher.verify(&req.password, &user.password_hash) {
            debug!(user_id = %user.id, "password mismatch");
            return Err(invalid_credentials());
        }
        if !user.is_approved {
            return Err(ServiceError::forbidden(
                "ACCOUNT_NOT_APPROVED",
                "Учетная запись ожидает подтверждения администратором",
            ));
        }

        let token = generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.ctx
            .stores
            .sessions
            .create(NewSession {
                user_id: user.id,
                token_hash: hash_token(&token),
                expires_at,
                user_agent,
                ip_address,
            })
            .await?;
        self.ctx.stores.users.touch_login(user.id).await?;

        info!(user_id = %user.id, "user logged in");
        self.ctx
            .events
            .emit(EventKind::UserLoggedIn, None, user.id, user.id);
        Ok(LoginResult {
            user,
            token,
            expires_at,
        })
    }

    /// Resolves a session token and slides its expiry forward.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, ServiceError> {
        let sessions = &self.ctx.stores.sessions;
        let mut session = sessions
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or_else(session_invalid)?;

        let now = Utc::now();
        if session.is_expired(now) {
            sessions.delete(session.id).await?;
            debug!(session_id = %session.id, "expired session removed");
            return Err(ServiceError::unauthorized(
                "SESSION_EXPIRED",
                "Сессия истекла. Пожалуйста, войдите снова",
            ));
        }

        let user = match self.ctx.stores.users.find_by_id(session.user_id).await? {
            Some(user) if user.is_approved => user,
            _ => {
                sessions.delete(session.id).await?;
                return Err(session_invalid());
            }
        };

        let expires_at = now + self.session_ttl;
        sessions.touch(session.id, expires_at).await?;
        session.expires_at = expires_at;
        session.last_activity_at = now;

        Ok(AuthContext { user, session })
    }

    /// Deletes the session behind `token`; unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        let sessions = &self.ctx.stores.sessions;
        if let Some(session) = sessions.find_by_token_hash(&hash_token(token)).await? {
            sessions.delete(session.id).await?;
            self.ctx
                .events
                .emit(EventKind::UserLoggedOut, None, session.user_id, session.user_id);
        }
        Ok(())
    }

    pub async fn logout_all(&self, user: &User) -> Result<u64, ServiceError> {
        let removed = self.ctx.stores.sessions.delete_for_user(user.id).await?;
        self.ctx
            .events
            .emit(EventKind::UserLoggedOut, None, user.id, user.id);
        Ok(removed)
    }

    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let removed = self.ctx.stores.sessions.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use db::{Stores, memory::MemoryStore};

    use super::*;
    use crate::services::{
        ServiceConfig, Services,
        cache::CacheConfig,
        test_support::{login_token, register, services},
    };

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin() {
        let services = services();
        let first = register(&services, "Alice").await;
        let second = register(&services, "Bob").await;

        assert_eq!(first.role, UserRole::Admin);
        assert!(first.is_approved);
        assert_eq!(second.role, UserRole::User);
        assert!(second.is_approved);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_case_insensitively() {
        let services = services();
        register(&services, "Alice").await;
        let err = services
            .auth
            .register(RegisterRequest {
                name: "Other".to_string(),
                email: "  ALICE@example.com ".to_string(),
                password: "password123".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EMAIL_EXISTS");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let services = services();
        let err = services
            .auth
            .register(RegisterRequest {
                name: " ".to_string(),
                email: "nope".to_string(),
                password: "short".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.details().len(), 3);
    }

    #[tokio::test]
    async fn test_login_and_authenticate() {
        let services = services();
        let user = register(&services, "Alice").await;
        let result = services
            .auth
            .login(login("alice@example.com", "password123"), None, None)
            .await
            .unwrap();
        assert_eq!(result.user.id, user.id);
        assert_eq!(result.token.len(), 64);

        let ctx = services.auth.authenticate(&result.token).await.unwrap();
        assert_eq!(ctx.user.id, user.id);
        assert!(ctx.session.expires_at >= result.expires_at);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let services = services();
        register(&services, "Alice").await;

        let err = services
            .auth
            .login(login("alice@example.com", "wrong-password"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CREDENTIALS");

        let err = services
            .auth
            .login(login("ghost@example.com", "password123"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_unapproved_user_cannot_login() {
        let services = Services::new(
            Stores::memory(),
            ServiceConfig {
                password_iterations: 1,
                require_approval: true,
                cache: CacheConfig::disabled(),
                ..ServiceConfig::default()
            },
        );
        register(&services, "Admin").await;
        let pending = register(&services, "Pending").await;
        assert!(!pending.is_approved);

        let err = services
            .auth
            .login(login("pending@example.com", "password123"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ACCOUNT_NOT_APPROVED");
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let memory = Arc::new(MemoryStore::new());
        let services = Services::new(
            Stores::from_memory(memory.clone()),
            ServiceConfig {
                password_iterations: 1,
                ..ServiceConfig::default()
            },
        );
        let user = register(&services, "Alice").await;
        let token = login_token(&services, "Alice").await;
        memory.expire_sessions(user.id).await;

        let err = services.auth.authenticate(&token).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_EXPIRED");
        assert_eq!(memory.session_count().await, 0);

        let err = services.auth.authenticate(&token).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_INVALID");
    }

    #[tokio::test]
    async fn test_logout_invalidates_token() {
        let services = services();
        register(&services, "Alice").await;
        let token = login_token(&services, "Alice").await;

        services.auth.logout(&token).await.unwrap();
        let err = services.auth.authenticate(&token).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_INVALID");

        services.auth.logout("unknown-token").await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let memory = Arc::new(MemoryStore::new());
        let services = Services::new(
            Stores::from_memory(memory.clone()),
            ServiceConfig {
                password_iterations: 1,
                ..ServiceConfig::default()
            },
        );
        let alice = register(&services, "Alice").await;
        register(&services, "Bob").await;
        login_token(&services, "Alice").await;
        login_token(&services, "Bob").await;
        memory.expire_sessions(alice.id).await;

        assert_eq!(services.auth.purge_expired().await.unwrap(), 1);
        assert_eq!(memory.session_count().await, 1);
    }
}
