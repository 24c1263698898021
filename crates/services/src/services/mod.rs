//! Domain services for Encore Tasks.
//!
//! Each service validates its input, checks project permissions through
//! [`permissions::Access`], calls the repositories in [`db::Stores`] and
//! publishes a [`events::DomainEvent`] for every successful write.

pub mod attachments;
pub mod auth;
pub mod boards;
pub mod cache;
pub mod columns;
pub mod comments;
pub mod error;
pub mod events;
pub mod password;
pub mod permissions;
pub mod projects;
pub mod tags;
pub mod tasks;
pub mod time_tracking;
pub mod users;
pub mod validation;

use chrono::Duration;
use db::Stores;

use self::{
    attachments::AttachmentService, auth::AuthService, boards::BoardService, cache::CacheConfig,
    cache::Caches, columns::ColumnService, comments::CommentService, events::EventBus,
    password::PasswordHasher, permissions::Access, projects::ProjectService, tags::TagService,
    tasks::TaskService, time_tracking::TimeTrackingService, users::UserService,
};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub session_ttl: Duration,
    pub require_approval: bool,
    pub password_iterations: u32,
    pub cache: CacheConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            require_approval: false,
            password_iterations: password::DEFAULT_ITERATIONS,
            cache: CacheConfig::default(),
        }
    }
}

/// Dependencies shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub stores: Stores,
    pub access: Access,
    pub events: EventBus,
}

impl ServiceContext {
    pub fn caches(&self) -> &Caches {
        self.access.caches()
    }
}

#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub users: UserService,
    pub projects: ProjectService,
    pub boards: BoardService,
    pub columns: ColumnService,
    pub tasks: TaskService,
    pub comments: CommentService,
    pub tags: TagService,
    pub attachments: AttachmentService,
    pub time_tracking: TimeTrackingService,
    pub events: EventBus,
}

impl Services {
    pub fn new(stores: Stores, config: ServiceConfig) -> Self {
        let caches = Caches::new(config.cache);
        let ctx = ServiceContext {
            access: Access::new(stores.projects.clone(), caches),
            stores,
            events: EventBus::new(),
        };
        let hasher = PasswordHasher::new(config.password_iterations);

        Self {
            auth: AuthService::new(
                ctx.clone(),
                hasher,
                config.session_ttl,
                config.require_approval,
            ),
            users: UserService::new(ctx.clone(), hasher),
            projects: ProjectService::new(ctx.clone()),
            boards: BoardService::new(ctx.clone()),
            columns: ColumnService::new(ctx.clone()),
            tasks: TaskService::new(ctx.clone()),
            comments: CommentService::new(ctx.clone()),
            tags: TagService::new(ctx.clone()),
            attachments: AttachmentService::new(ctx.clone()),
            time_tracking: TimeTrackingService::new(ctx.clone()),
            events: ctx.events,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use db::{Stores, models::user::User};

    use super::{
        Services, ServiceConfig,
        auth::{LoginRequest, RegisterRequest},
        cache::CacheConfig,
    };

    pub fn services() -> Services {
        services_with_stores().0
    }

    pub fn services_with_stores() -> (Services, Stores) {
        build(CacheConfig::disabled())
    }

    /// Services with the production cache settings, for write-then-read flows.
    pub fn services_cached() -> Services {
        build(CacheConfig::default()).0
    }

    fn build(cache: CacheConfig) -> (Services, Stores) {
        let stores = Stores::memory();
        let services = Services::new(
            stores.clone(),
            ServiceConfig {
                password_iterations: 1,
                cache,
                ..ServiceConfig::default()
            },
        );
        (services, stores)
    }

    /// Registers and returns a user; the first one becomes a global admin.
    pub async fn register(services: &Services, name: &str) -> User {
        services
            .auth
            .register(RegisterRequest {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                password: "password123".to_string(),
            })
            .await
            .unwrap()
    }

    pub async fn login_token(services: &Services, name: &str) -> String {
        services
            .auth
            .login(
                LoginRequest {
                    email: format!("{}@example.com", name.to_lowercase()),
                    password: "password123".to_string(),
                },
                None,
                None,
            )
            .await
            .unwrap()
            .token
    }
}
