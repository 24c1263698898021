use db::models::user::{UpdateUserData, User, UserRole};
use serde::Deserialize;
use tracing::{info, instrument};
use utils::response::FieldError;
use uuid::Uuid;

use super::{
    ServiceContext,
    auth::{email_exists, normalize_email},
    error::ServiceError,
    events::EventKind,
    password::PasswordHasher,
    validation::{AVATAR_URL_MAX, USER_NAME_MAX, Validator},
};

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

fn validate_profile(data: &UpdateUserData) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    if let Some(name) = &data.name {
        v.required_text("name", name, USER_NAME_MAX);
    }
    if let Some(email) = &data.email {
        v.email("email", email);
    }
    if let Some(Some(avatar)) = &data.avatar_url {
        v.optional_text("avatar_url", Some(avatar), AVATAR_URL_MAX);
    }
    v.finish()
}

pub(crate) fn user_not_found() -> ServiceError {
    ServiceError::not_found("USER_NOT_FOUND", "Пользователь не найден")
}

fn require_admin(actor: &User) -> Result<(), ServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::insufficient_permissions())
    }
}

#[derive(Clone)]
pub struct UserService {
    ctx: ServiceContext,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(ctx: ServiceContext, hasher: PasswordHasher) -> Self {
        Self { ctx, hasher }
    }

    /// Admins also see accounts awaiting approval.
    pub async fn list(&self, actor: &User) -> Result<Vec<User>, ServiceError> {
        Ok(self.ctx.stores.users.list(actor.is_admin()).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, ServiceError> {
        self.ctx
            .stores
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(user_not_found)
    }

    #[instrument(name = "users.update_profile", skip(self, actor, data), fields(actor_id = %actor.id))]
    pub async fn update_profile(
        &self,
        actor: &User,
        id: Uuid,
        mut data: UpdateUserData,
    ) -> Result<User, ServiceError> {
        if actor.id != id {
            require_admin(actor)?;
        }
        validate_profile(&data)?;
        data.name = data.name.map(|n| n.trim().to_string());
        data.email = data.email.as_deref().map(normalize_email);
        data.avatar_url = data
            .avatar_url
            .map(|url| url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()));

        self.get(id).await?;
        if let Some(email) = &data.email
            && let Some(existing) = self.ctx.stores.users.find_by_email(email).await?
            && existing.id != id
        {
            return Err(email_exists());
        }

        let user = self
            .ctx
            .stores
            .users
            .update(id, data)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict { .. } => email_exists(),
                ServiceError::NotFound { .. } => user_not_found(),
                other => other,
            })?;
        self.ctx
            .events
            .emit(EventKind::UserUpdated, None, user.id, actor.id);
        Ok(user)
    }

    /// Changing one's own password requires the current one. Every session
    /// of the user is revoked afterwards.
    #[instrument(name = "users.change_password", skip(self, actor, req), fields(actor_id = %actor.id))]
    pub async fn change_password(
        &self,
        actor: &User,
        id: Uuid,
        req: ChangePasswordRequest,
    ) -> Result<u64, ServiceError> {
        let mut v = Validator::new();
        v.password("new_password", &req.new_password);
        v.finish()?;

        let target = if actor.id == id {
            let current = req.current_password.as_deref().unwrap_or_default();
            if !self.hasher.verify(current, &actor.password_hash) {
                return Err(ServiceError::validation(vec![FieldError::new(
                    "current_password",
                    "Неверный текущий пароль",
                )]));
            }
            actor.clone()
        } else {
            require_admin(actor)?;
            self.get(id).await?
        };

        let password_hash = self
            .hasher
            .hash(&req.new_password)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        self.ctx
            .stores
            .users
            .set_password(target.id, &password_hash)
            .await?;
        let revoked = self.ctx.stores.sessions.delete_for_user(target.id).await?;
        info!(user_id = %target.id, revoked, "password changed");
        self.ctx
            .events
            .emit(EventKind::UserUpdated, None, target.id, actor.id);
        Ok(revoked)
    }

    #[instrument(name = "users.set_role", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn set_role(
        &self,
        actor: &User,
        id: Uuid,
        role: UserRole,
    ) -> Result<User, ServiceError> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(ServiceError::conflict(
                "CANNOT_CHANGE_OWN_ROLE",
                "Нельзя изменить собственную роль",
            ));
        }
        self.get(id).await?;
        let user = self.ctx.stores.users.set_role(id, role).await?;
        self.ctx
            .events
            .emit(EventKind::UserRoleChanged, None, user.id, actor.id);
        Ok(user)
    }

    pub async fn approve(&self, actor: &User, id: Uuid) -> Result<User, ServiceError> {
        require_admin(actor)?;
        self.get(id).await?;
        let user = self.ctx.stores.users.set_approved(id, true).await?;
        info!(user_id = %user.id, approved_by = %actor.id, "user approved");
        self.ctx
            .events
            .emit(EventKind::UserApproved, None, user.id, actor.id);
        Ok(user)
    }

    #[instrument(name = "users.delete", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(ServiceError::conflict(
                "CANNOT_DELETE_SELF",
                "Нельзя удалить собственную учетную запись",
            ));
        }
        self.get(id).await?;
        self.ctx.stores.users.soft_delete(id).await?;
        self.ctx.stores.sessions.delete_for_user(id).await?;
        self.ctx.caches().invalidate_user(id);
        self.ctx
            .events
            .emit(EventKind::UserDeleted, None, id, actor.id);
        Ok(())
    }
}
