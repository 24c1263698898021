//! In-memory implementation of every store trait, for service and HTTP tests.
//!
//! Mirrors the PostgreSQL repositories: ordering, position compaction,
//! soft-delete visibility and the unique constraints of the schema.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    RepositoryError,
    models::{
        attachment::{Attachment, AttachmentStore, NewAttachment},
        board::{Board, BoardStore, NewBoard, SeedColumn, UpdateBoardData},
        column::{Column, ColumnStore, NewColumn, UpdateColumnData},
        comment::{Comment, CommentStore, NewComment},
        project::{
            NewProject, Project, ProjectMember, ProjectMemberWithUser, ProjectRole, ProjectStore,
            UpdateProjectData,
        },
        session::{NewSession, Session, SessionStore},
        tag::{NewTag, Tag, TagStore, TaskTag},
        task::{
            NewTask, Task, TaskFilter, TaskStore, UpdateTaskData, clamp_new_column,
            clamp_same_column,
        },
        time_entry::{NewTimeEntry, TimeEntry, TimeEntryStore},
        user::{NewUser, UpdateUserData, User, UserRole, UserStore},
    },
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    sessions: Vec<Session>,
    projects: Vec<Project>,
    members: Vec<ProjectMember>,
    boards: Vec<Board>,
    columns: Vec<Column>,
    tasks: Vec<Task>,
    comments: Vec<Comment>,
    tags: Vec<Tag>,
    task_tags: Vec<TaskTag>,
    attachments: Vec<Attachment>,
    time_entries: Vec<TimeEntry>,
}

impl State {
    fn insert_board(&mut self, data: NewBoard) -> Board {
        let now = Utc::now();
        let board = Board {
            id: Uuid::new_v4(),
            project_id: data.project_id,
            name: data.name,
            description: data.description,
            position: self.next_board_position(data.project_id),
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.boards.push(board.clone());
        board
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users.iter().any(|u| {
            u.deleted_at.is_none() && Some(u.id) != except && u.email.eq_ignore_ascii_case(email)
        })
    }

    fn live_user_mut(&mut self, id: Uuid) -> Result<&mut User, RepositoryError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)
    }

    fn live_project_mut(&mut self, id: Uuid) -> Result<&mut Project, RepositoryError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)
    }

    fn next_board_position(&self, project_id: Uuid) -> i32 {
        self.boards
            .iter()
            .filter(|b| b.project_id == project_id && b.deleted_at.is_none())
            .map(|b| b.position + 1)
            .max()
            .unwrap_or(0)
    }

    fn next_column_position(&self, board_id: Uuid) -> i32 {
        self.columns
            .iter()
            .filter(|c| c.board_id == board_id && c.deleted_at.is_none())
            .map(|c| c.position + 1)
            .max()
            .unwrap_or(0)
    }

    fn next_task_position(&self, column_id: Uuid) -> i32 {
        self.tasks
            .iter()
            .filter(|t| t.column_id == column_id && t.deleted_at.is_none())
            .map(|t| t.position + 1)
            .max()
            .unwrap_or(0)
    }

    fn live_tasks_in_column(&self, column_id: Uuid) -> i64 {
        self.tasks
            .iter()
            .filter(|t| t.column_id == column_id && t.deleted_at.is_none())
            .count() as i64
    }

    fn tag_name_taken(&self, project_id: Option<Uuid>, name: &str) -> bool {
        self.tags
            .iter()
            .any(|t| t.project_id == project_id && t.name.to_lowercase() == name.to_lowercase())
    }
}

/// Shared in-memory state behind every store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move every session of the user into the past.
    pub async fn expire_sessions(&self, user_id: Uuid) {
        let mut state = self.state.write().await;
        let past = Utc::now() - Duration::minutes(1);
        for session in state.sessions.iter_mut().filter(|s| s.user_id == user_id) {
            session.expires_at = past;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, data: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let email = data.email.trim().to_lowercase();
        if state.email_taken(&email, None) {
            return Err(RepositoryError::Conflict("users_email_live_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            name: data.name,
            password_hash: data.password_hash,
            role: data.role,
            is_approved: data.is_approved,
            avatar_url: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        let email = email.trim();
        Ok(state
            .users
            .iter()
            .find(|u| u.deleted_at.is_none() && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list(&self, include_unapproved: bool) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .iter()
            .filter(|u| u.deleted_at.is_none() && (include_unapproved || u.is_approved))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(users)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(self.state.read().await.users.len() as i64)
    }

    async fn update(&self, id: Uuid, data: UpdateUserData) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let email = data.email.map(|e| e.trim().to_lowercase());
        if let Some(email) = &email
            && state.email_taken(email, Some(id))
        {
            return Err(RepositoryError::Conflict("users_email_live_key".to_string()));
        }

        let user = state.live_user_mut(id)?;
        if let Some(name) = data.name {
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(avatar_url) = data.avatar_url {
            user.avatar_url = avatar_url;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.live_user_mut(id)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.live_user_mut(id)?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_approved(&self, id: Uuid, approved: bool) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.live_user_mut(id)?;
        user.is_approved = approved;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn touch_login(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let user = state.live_user_mut(id)?;
        let now = Utc::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, data: NewSession) -> Result<Session, RepositoryError> {
        let mut state = self.state.write().await;
        if state.sessions.iter().any(|s| s.token_hash == data.token_hash) {
            return Err(RepositoryError::Conflict(
                "user_sessions_token_hash_key".to_string(),
            ));
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            token_hash: data.token_hash,
            expires_at: data.expires_at,
            last_activity_at: now,
            created_at: now,
            user_agent: data.user_agent,
            ip_address: data.ip_address,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn touch(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) {
            session.expires_at = expires_at;
            session.last_activity_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.state.write().await.sessions.retain(|s| s.id != id);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| !s.is_expired(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create(&self, data: NewProject, owner_id: Uuid) -> Result<Project, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            color: data.color,
            icon: data.icon,
            owner_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.members.push(ProjectMember {
            project_id: project.id,
            user_id: owner_id,
            role: ProjectRole::Owner,
            joined_at: now,
        });
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Project>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .projects
            .iter()
            .find(|p| p.id == id && (include_deleted || p.deleted_at.is_none()))
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Project>, RepositoryError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .iter()
            .filter(|p| {
                p.deleted_at.is_none()
                    && state
                        .members
                        .iter()
                        .any(|m| m.project_id == p.id && m.user_id == user_id)
            })
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn list_all(&self) -> Result<Vec<Project>, RepositoryError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .iter()
            .filter(|p| p.deleted_at.is_none())
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn update(
        &self,
        id: Uuid,
        data: UpdateProjectData,
    ) -> Result<Project, RepositoryError> {
        let mut state = self.state.write().await;
        let project = state.live_project_mut(id)?;
        if let Some(name) = data.name {
            project.name = name;
        }
        if let Some(description) = data.description {
            project.description = description;
        }
        if let Some(color) = data.color {
            project.color = color;
        }
        if let Some(icon) = data.icon {
            project.icon = icon;
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let project = state.live_project_mut(id)?;
        let now = Utc::now();
        project.deleted_at = Some(now);
        project.updated_at = now;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<Project, RepositoryError> {
        let mut state = self.state.write().await;
        let project = state
            .projects
            .iter_mut()
            .find(|p| p.id == id && p.deleted_at.is_some())
            .ok_or(RepositoryError::NotFound)?;
        project.deleted_at = None;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn list_members(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberWithUser>, RepositoryError> {
        let state = self.state.read().await;
        let mut members: Vec<ProjectMemberWithUser> = state
            .members
            .iter()
            .filter(|m| m.project_id == project_id)
            .filter_map(|m| {
                state
                    .users
                    .iter()
                    .find(|u| u.id == m.user_id && u.deleted_at.is_none())
                    .map(|u| ProjectMemberWithUser {
                        project_id: m.project_id,
                        user_id: m.user_id,
                        role: m.role,
                        joined_at: m.joined_at,
                        name: u.name.clone(),
                        email: u.email.clone(),
                    })
            })
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    async fn find_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectMember>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .iter()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .cloned())
    }

    async fn add_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMember, RepositoryError> {
        let mut state = self.state.write().await;
        if state
            .members
            .iter()
            .any(|m| m.project_id == project_id && m.user_id == user_id)
        {
            return Err(RepositoryError::Conflict("project_members_pkey".to_string()));
        }

        let member = ProjectMember {
            project_id,
            user_id,
            role,
            joined_at: Utc::now(),
        };
        state.members.push(member.clone());
        Ok(member)
    }

    async fn update_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMember, RepositoryError> {
        let mut state = self.state.write().await;
        let member = state
            .members
            .iter_mut()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
            .ok_or(RepositoryError::NotFound)?;
        member.role = role;
        Ok(member.clone())
    }

    async fn remove_member(&self, project_id: Uuid, user_id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.members.len();
        state
            .members
            .retain(|m| !(m.project_id == project_id && m.user_id == user_id));
        if state.members.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn create(&self, data: NewBoard) -> Result<Board, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.insert_board(data))
    }

    async fn create_with_columns(
        &self,
        data: NewBoard,
        columns: Vec<SeedColumn>,
    ) -> Result<(Board, Vec<Column>), RepositoryError> {
        let mut state = self.state.write().await;
        let board = state.insert_board(data);
        let now = Utc::now();
        let columns: Vec<Column> = (0_i32..)
            .zip(columns)
            .map(|(position, seed)| Column {
                id: Uuid::new_v4(),
                board_id: board.id,
                title: seed.title,
                color: seed.color,
                position,
                wip_limit: None,
                created_by: board.created_by,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .collect();
        state.columns.extend(columns.iter().cloned());
        Ok((board, columns))
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Board>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .boards
            .iter()
            .find(|b| b.id == id && (include_deleted || b.deleted_at.is_none()))
            .cloned())
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Board>, RepositoryError> {
        let state = self.state.read().await;
        let mut boards: Vec<Board> = state
            .boards
            .iter()
            .filter(|b| b.project_id == project_id && b.deleted_at.is_none())
            .cloned()
            .collect();
        boards.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(boards)
    }

    async fn update(&self, id: Uuid, data: UpdateBoardData) -> Result<Board, RepositoryError> {
        let mut state = self.state.write().await;
        let board = state
            .boards
            .iter_mut()
            .find(|b| b.id == id && b.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        if let Some(name) = data.name {
            board.name = name;
        }
        if let Some(description) = data.description {
            board.description = description;
        }
        board.updated_at = Utc::now();
        Ok(board.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let board = state
            .boards
            .iter_mut()
            .find(|b| b.id == id && b.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        board.deleted_at = Some(now);
        board.updated_at = now;
        let (project_id, position) = (board.project_id, board.position);

        for other in state
            .boards
            .iter_mut()
            .filter(|b| b.project_id == project_id && b.deleted_at.is_none())
        {
            if other.position > position {
                other.position -= 1;
            }
        }
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<Board, RepositoryError> {
        let mut state = self.state.write().await;
        let project_id = state
            .boards
            .iter()
            .find(|b| b.id == id && b.deleted_at.is_some())
            .map(|b| b.project_id)
            .ok_or(RepositoryError::NotFound)?;
        let position = state.next_board_position(project_id);

        let board = state
            .boards
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(RepositoryError::NotFound)?;
        board.deleted_at = None;
        board.position = position;
        board.updated_at = Utc::now();
        Ok(board.clone())
    }

    async fn reorder(&self, project_id: Uuid, ids: &[Uuid]) -> Result<Vec<Board>, RepositoryError> {
        {
            let mut state = self.state.write().await;
            let all_live = ids.iter().all(|id| {
                state
                    .boards
                    .iter()
                    .any(|b| b.id == *id && b.project_id == project_id && b.deleted_at.is_none())
            });
            if !all_live {
                return Err(RepositoryError::NotFound);
            }

            let now = Utc::now();
            for (position, id) in ids.iter().enumerate() {
                if let Some(board) = state.boards.iter_mut().find(|b| b.id == *id) {
                    board.position = position as i32;
                    board.updated_at = now;
                }
            }
        }
        self.list_by_project(project_id).await
    }
}

#[async_trait]
impl ColumnStore for MemoryStore {
    async fn create(&self, data: NewColumn) -> Result<Column, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let column = Column {
            id: Uuid::new_v4(),
            board_id: data.board_id,
            title: data.title,
            color: data.color,
            position: state.next_column_position(data.board_id),
            wip_limit: data.wip_limit,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.columns.push(column.clone());
        Ok(column)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Column>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .columns
            .iter()
            .find(|c| c.id == id && (include_deleted || c.deleted_at.is_none()))
            .cloned())
    }

    async fn list_by_board(&self, board_id: Uuid) -> Result<Vec<Column>, RepositoryError> {
        let state = self.state.read().await;
        let mut columns: Vec<Column> = state
            .columns
            .iter()
            .filter(|c| c.board_id == board_id && c.deleted_at.is_none())
            .cloned()
            .collect();
        columns.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(columns)
    }

    async fn update(&self, id: Uuid, data: UpdateColumnData) -> Result<Column, RepositoryError> {
        let mut state = self.state.write().await;
        let column = state
            .columns
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        if let Some(title) = data.title {
            column.title = title;
        }
        if let Some(color) = data.color {
            column.color = color;
        }
        if let Some(wip_limit) = data.wip_limit {
            column.wip_limit = wip_limit;
        }
        column.updated_at = Utc::now();
        Ok(column.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let column = state
            .columns
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        column.deleted_at = Some(now);
        column.updated_at = now;
        let (board_id, position) = (column.board_id, column.position);

        for other in state
            .columns
            .iter_mut()
            .filter(|c| c.board_id == board_id && c.deleted_at.is_none())
        {
            if other.position > position {
                other.position -= 1;
            }
        }
        Ok(())
    }

    async fn reorder(&self, board_id: Uuid, ids: &[Uuid]) -> Result<Vec<Column>, RepositoryError> {
        {
            let mut state = self.state.write().await;
            let all_live = ids.iter().all(|id| {
                state
                    .columns
                    .iter()
                    .any(|c| c.id == *id && c.board_id == board_id && c.deleted_at.is_none())
            });
            if !all_live {
                return Err(RepositoryError::NotFound);
            }

            let now = Utc::now();
            for (position, id) in ids.iter().enumerate() {
                if let Some(column) = state.columns.iter_mut().find(|c| c.id == *id) {
                    column.position = position as i32;
                    column.updated_at = now;
                }
            }
        }
        self.list_by_board(board_id).await
    }
}

fn task_matches(task: &Task, filter: &TaskFilter) -> bool {
    if !filter.include_deleted && task.deleted_at.is_some() {
        return false;
    }
    if filter.project_id.is_some_and(|id| task.project_id != id)
        || filter.board_id.is_some_and(|id| task.board_id != id)
        || filter.column_id.is_some_and(|id| task.column_id != id)
        || filter.status.is_some_and(|s| task.status != s)
        || filter.priority.is_some_and(|p| task.priority != p)
    {
        return false;
    }
    if let Some(assignee) = filter.assignee_id
        && task.assignee_id != Some(assignee)
    {
        return false;
    }
    if let Some(ids) = &filter.project_ids
        && !ids.contains(&task.project_id)
    {
        return false;
    }
    if let Some(term) = filter.search_term() {
        let term = term.to_lowercase();
        let in_title = task.title.to_lowercase().contains(&term);
        let in_description = task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&term));
        if !in_title && !in_description {
            return false;
        }
    }
    true
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, data: NewTask) -> Result<Task, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: data.project_id,
            board_id: data.board_id,
            column_id: data.column_id,
            title: data.title,
            description: data.description,
            status: data.status,
            priority: data.priority,
            assignee_id: data.assignee_id,
            reporter_id: data.reporter_id,
            position: state.next_task_position(data.column_id),
            due_date: data.due_date,
            estimated_hours: data.estimated_hours,
            actual_minutes: 0,
            completed_at: data.completed_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Task>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .find(|t| t.id == id && (include_deleted || t.deleted_at.is_none()))
            .cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|t| task_matches(t, filter))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.board_id
                .cmp(&b.board_id)
                .then(a.column_id.cmp(&b.column_id))
                .then(a.position.cmp(&b.position))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(tasks
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn update(&self, id: Uuid, data: UpdateTaskData) -> Result<Task, RepositoryError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        if let Some(title) = data.title {
            task.title = title;
        }
        if let Some(description) = data.description {
            task.description = description;
        }
        if let Some(status) = data.status {
            task.status = status;
        }
        if let Some(priority) = data.priority {
            task.priority = priority;
        }
        if let Some(assignee_id) = data.assignee_id {
            task.assignee_id = assignee_id;
        }
        if let Some(due_date) = data.due_date {
            task.due_date = due_date;
        }
        if let Some(estimated_hours) = data.estimated_hours {
            task.estimated_hours = estimated_hours;
        }
        if let Some(completed_at) = data.completed_at {
            task.completed_at = completed_at;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn move_to(
        &self,
        id: Uuid,
        column_id: Uuid,
        board_id: Uuid,
        position: i32,
    ) -> Result<Task, RepositoryError> {
        let mut state = self.state.write().await;
        let (source_column, source_position) = state
            .tasks
            .iter()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .map(|t| (t.column_id, t.position))
            .ok_or(RepositoryError::NotFound)?;

        let target = if source_column == column_id {
            let target = clamp_same_column(position, state.live_tasks_in_column(column_id));
            for task in state
                .tasks
                .iter_mut()
                .filter(|t| t.column_id == column_id && t.deleted_at.is_none() && t.id != id)
            {
                if target < source_position
                    && task.position >= target
                    && task.position < source_position
                {
                    task.position += 1;
                } else if target > source_position
                    && task.position > source_position
                    && task.position <= target
                {
                    task.position -= 1;
                }
            }
            target
        } else {
            for task in state
                .tasks
                .iter_mut()
                .filter(|t| t.column_id == source_column && t.deleted_at.is_none())
            {
                if task.position > source_position {
                    task.position -= 1;
                }
            }
            let target = clamp_new_column(position, state.live_tasks_in_column(column_id));
            for task in state
                .tasks
                .iter_mut()
                .filter(|t| t.column_id == column_id && t.deleted_at.is_none())
            {
                if task.position >= target {
                    task.position += 1;
                }
            }
            target
        };

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(RepositoryError::NotFound)?;
        task.column_id = column_id;
        task.board_id = board_id;
        task.position = target;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn count_in_column(&self, column_id: Uuid) -> Result<i64, RepositoryError> {
        Ok(self.state.read().await.live_tasks_in_column(column_id))
    }

    async fn count_in_board(&self, board_id: Uuid) -> Result<i64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.board_id == board_id && t.deleted_at.is_none())
            .count() as i64)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        task.deleted_at = Some(now);
        task.updated_at = now;
        let (column_id, position) = (task.column_id, task.position);

        for other in state
            .tasks
            .iter_mut()
            .filter(|t| t.column_id == column_id && t.deleted_at.is_none())
        {
            if other.position > position {
                other.position -= 1;
            }
        }
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<Task, RepositoryError> {
        let mut state = self.state.write().await;
        let column_id = state
            .tasks
            .iter()
            .find(|t| t.id == id && t.deleted_at.is_some())
            .map(|t| t.column_id)
            .ok_or(RepositoryError::NotFound)?;
        let position = state.next_task_position(column_id);

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(RepositoryError::NotFound)?;
        task.deleted_at = None;
        task.position = position;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn add_minutes(&self, id: Uuid, minutes: i32) -> Result<Task, RepositoryError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        task.actual_minutes += minutes;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn create(&self, data: NewComment) -> Result<Comment, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            task_id: data.task_id,
            author_id: data.author_id,
            content: data.content,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<Comment>, RepositoryError> {
        let state = self.state.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.task_id == task_id && c.deleted_at.is_none())
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn update(&self, id: Uuid, content: &str) -> Result<Comment, RepositoryError> {
        let mut state = self.state.write().await;
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        comment.content = content.to_string();
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();
        comment.deleted_at = Some(now);
        comment.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn create(&self, data: NewTag) -> Result<Tag, RepositoryError> {
        let mut state = self.state.write().await;
        if state.tag_name_taken(data.project_id, &data.name) {
            return Err(RepositoryError::Conflict("tags_scope_name_key".to_string()));
        }

        let tag = Tag {
            id: Uuid::new_v4(),
            project_id: data.project_id,
            name: data.name,
            color: data.color,
            created_at: Utc::now(),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tag>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.tags.iter().find(|t| t.id == id).cloned())
    }

    async fn list(&self, project_id: Option<Uuid>) -> Result<Vec<Tag>, RepositoryError> {
        let state = self.state.read().await;
        let mut tags: Vec<Tag> = state
            .tags
            .iter()
            .filter(|t| {
                t.project_id.is_none() || (project_id.is_some() && t.project_id == project_id)
            })
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.tags.len();
        state.tags.retain(|t| t.id != id);
        if state.tags.len() == before {
            return Err(RepositoryError::NotFound);
        }
        state.task_tags.retain(|tt| tt.tag_id != id);
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Tag>, RepositoryError> {
        let state = self.state.read().await;
        let mut tags: Vec<Tag> = state
            .tags
            .iter()
            .filter(|t| {
                state
                    .task_tags
                    .iter()
                    .any(|tt| tt.task_id == task_id && tt.tag_id == t.id)
            })
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn set_for_task(
        &self,
        task_id: Uuid,
        tag_ids: &[Uuid],
    ) -> Result<Vec<Tag>, RepositoryError> {
        {
            let mut state = self.state.write().await;
            if let Some(missing) = tag_ids
                .iter()
                .find(|id| !state.tags.iter().any(|t| t.id == **id))
            {
                return Err(RepositoryError::Conflict(format!("unknown tag {missing}")));
            }

            state.task_tags.retain(|tt| tt.task_id != task_id);
            let now = Utc::now();
            for &tag_id in tag_ids {
                if !state
                    .task_tags
                    .iter()
                    .any(|tt| tt.task_id == task_id && tt.tag_id == tag_id)
                {
                    state.task_tags.push(TaskTag {
                        task_id,
                        tag_id,
                        created_at: now,
                    });
                }
            }
        }
        self.list_for_task(task_id).await
    }
}

#[async_trait]
impl AttachmentStore for MemoryStore {
    async fn create(&self, data: NewAttachment) -> Result<Attachment, RepositoryError> {
        let mut state = self.state.write().await;
        if state.attachments.iter().any(|a| a.id == data.id) {
            return Err(RepositoryError::Conflict("attachments_pkey".to_string()));
        }

        let attachment = Attachment {
            id: data.id,
            task_id: data.task_id,
            uploaded_by: data.uploaded_by,
            file_name: data.file_name,
            file_size: data.file_size,
            mime_type: data.mime_type,
            storage_path: data.storage_path,
            created_at: Utc::now(),
            deleted_at: None,
        };
        state.attachments.push(attachment.clone());
        Ok(attachment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .attachments
            .iter()
            .find(|a| a.id == id && a.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<Attachment>, RepositoryError> {
        let state = self.state.read().await;
        let mut attachments: Vec<Attachment> = state
            .attachments
            .iter()
            .filter(|a| a.task_id == task_id && a.deleted_at.is_none())
            .cloned()
            .collect();
        attachments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(attachments)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let attachment = state
            .attachments
            .iter_mut()
            .find(|a| a.id == id && a.deleted_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        attachment.deleted_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl TimeEntryStore for MemoryStore {
    async fn create(&self, data: NewTimeEntry) -> Result<TimeEntry, RepositoryError> {
        let mut state = self.state.write().await;
        if data.ended_at.is_none()
            && state.time_entries.iter().any(|e| {
                e.task_id == data.task_id && e.user_id == data.user_id && e.ended_at.is_none()
            })
        {
            return Err(RepositoryError::Conflict(
                "time_entries_running_key".to_string(),
            ));
        }

        let entry = TimeEntry {
            id: Uuid::new_v4(),
            task_id: data.task_id,
            user_id: data.user_id,
            started_at: data.started_at,
            ended_at: data.ended_at,
            duration_minutes: data.duration_minutes,
            description: data.description,
            created_at: Utc::now(),
        };
        state.time_entries.push(entry.clone());
        Ok(entry)
    }

    async fn find_running(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TimeEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .time_entries
            .iter()
            .find(|e| e.task_id == task_id && e.user_id == user_id && e.ended_at.is_none())
            .cloned())
    }

    async fn stop(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<TimeEntry, RepositoryError> {
        let mut state = self.state.write().await;
        let entry = state
            .time_entries
            .iter_mut()
            .find(|e| e.id == id && e.ended_at.is_none())
            .ok_or(RepositoryError::NotFound)?;
        entry.ended_at = Some(ended_at);
        entry.duration_minutes = Some(duration_minutes);
        Ok(entry.clone())
    }

    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<TimeEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut entries: Vec<TimeEntry> = state
            .time_entries
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{TaskPriority, TaskStatus};

    async fn seed_board(store: &MemoryStore) -> (Uuid, Uuid) {
        let owner = UserStore::create(
            store,
            NewUser {
                email: "Owner@Example.com".to_string(),
                name: "Owner".to_string(),
                password_hash: "x".to_string(),
                role: UserRole::User,
                is_approved: true,
            },
        )
        .await
        .unwrap();
        let project = ProjectStore::create(
            store,
            NewProject {
                name: "P".to_string(),
                description: None,
                color: "#3b82f6".to_string(),
                icon: None,
            },
            owner.id,
        )
        .await
        .unwrap();
        let board = BoardStore::create(
            store,
            NewBoard {
                project_id: project.id,
                name: "B".to_string(),
                description: None,
                created_by: Some(owner.id),
            },
        )
        .await
        .unwrap();
        (project.id, board.id)
    }

    async fn column(store: &MemoryStore, board_id: Uuid, title: &str) -> Column {
        ColumnStore::create(
            store,
            NewColumn {
                board_id,
                title: title.to_string(),
                color: "#6b7280".to_string(),
                wip_limit: None,
                created_by: None,
            },
        )
        .await
        .unwrap()
    }

    async fn task(
        store: &MemoryStore,
        project_id: Uuid,
        board_id: Uuid,
        column_id: Uuid,
        title: &str,
    ) -> Task {
        TaskStore::create(
            store,
            NewTask {
                project_id,
                board_id,
                column_id,
                title: title.to_string(),
                description: None,
                status: TaskStatus::Todo,
                priority: TaskPriority::Medium,
                assignee_id: None,
                reporter_id: None,
                due_date: None,
                estimated_hours: None,
                completed_at: None,
            },
        )
        .await
        .unwrap()
    }

    async fn titles_in(store: &MemoryStore, column_id: Uuid) -> Vec<(String, i32)> {
        let filter = TaskFilter {
            column_id: Some(column_id),
            ..Default::default()
        };
        TaskStore::list(store, &filter)
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.title, t.position))
            .collect()
    }

    #[tokio::test]
    async fn test_email_is_unique_case_insensitively() {
        let store = MemoryStore::new();
        seed_board(&store).await;
        let err = UserStore::create(
            &store,
            NewUser {
                email: "owner@example.COM".to_string(),
                name: "Other".to_string(),
                password_hash: "x".to_string(),
                role: UserRole::User,
                is_approved: true,
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_conflict());

        let found = store.find_by_email("OWNER@example.com").await.unwrap();
        assert_eq!(found.unwrap().email, "owner@example.com");
    }

    #[tokio::test]
    async fn test_project_create_adds_owner_member() {
        let store = MemoryStore::new();
        let (project_id, _) = seed_board(&store).await;
        let members = store.list_members(project_id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, ProjectRole::Owner);
    }

    #[tokio::test]
    async fn test_column_delete_compacts_positions() {
        let store = MemoryStore::new();
        let (_, board_id) = seed_board(&store).await;
        let a = column(&store, board_id, "A").await;
        let b = column(&store, board_id, "B").await;
        let c = column(&store, board_id, "C").await;
        assert_eq!((a.position, b.position, c.position), (0, 1, 2));

        ColumnStore::soft_delete(&store, b.id).await.unwrap();
        let remaining = store.list_by_board(board_id).await.unwrap();
        let positions: Vec<_> = remaining
            .iter()
            .map(|c| (c.title.as_str(), c.position))
            .collect();
        assert_eq!(positions, vec![("A", 0), ("C", 1)]);
    }

    #[tokio::test]
    async fn test_board_with_columns_created_together() {
        let store = MemoryStore::new();
        let (project_id, _) = seed_board(&store).await;
        let seeds = ["Todo", "Done"].map(|title| SeedColumn {
            title: title.to_string(),
            color: "#6b7280".to_string(),
        });

        let (board, columns) = store
            .create_with_columns(
                NewBoard {
                    project_id,
                    name: "Second".to_string(),
                    description: None,
                    created_by: None,
                },
                seeds.to_vec(),
            )
            .await
            .unwrap();
        assert_eq!(board.position, 1);

        let stored = store.list_by_board(board.id).await.unwrap();
        let titles: Vec<_> = stored
            .iter()
            .map(|c| (c.title.as_str(), c.position))
            .collect();
        assert_eq!(titles, vec![("Todo", 0), ("Done", 1)]);
        assert_eq!(stored.len(), columns.len());
    }

    #[tokio::test]
    async fn test_move_within_column_shifts_siblings() {
        let store = MemoryStore::new();
        let (project_id, board_id) = seed_board(&store).await;
        let col = column(&store, board_id, "Todo").await;
        task(&store, project_id, board_id, col.id, "one").await;
        task(&store, project_id, board_id, col.id, "two").await;
        let three = task(&store, project_id, board_id, col.id, "three").await;

        let moved = store.move_to(three.id, col.id, board_id, 0).await.unwrap();
        assert_eq!(moved.position, 0);
        assert_eq!(
            titles_in(&store, col.id).await,
            vec![
                ("three".to_string(), 0),
                ("one".to_string(), 1),
                ("two".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_move_across_columns_clamps_and_compacts() {
        let store = MemoryStore::new();
        let (project_id, board_id) = seed_board(&store).await;
        let todo = column(&store, board_id, "Todo").await;
        let done = column(&store, board_id, "Done").await;
        let one = task(&store, project_id, board_id, todo.id, "one").await;
        task(&store, project_id, board_id, todo.id, "two").await;
        task(&store, project_id, board_id, done.id, "shipped").await;

        let moved = store.move_to(one.id, done.id, board_id, 99).await.unwrap();
        assert_eq!(moved.column_id, done.id);
        assert_eq!(moved.position, 1);
        assert_eq!(titles_in(&store, todo.id).await, vec![("two".to_string(), 0)]);
        assert_eq!(
            titles_in(&store, done.id).await,
            vec![("shipped".to_string(), 0), ("one".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_task_restore_appends_to_column() {
        let store = MemoryStore::new();
        let (project_id, board_id) = seed_board(&store).await;
        let col = column(&store, board_id, "Todo").await;
        let first = task(&store, project_id, board_id, col.id, "first").await;
        task(&store, project_id, board_id, col.id, "second").await;

        TaskStore::soft_delete(&store, first.id).await.unwrap();
        assert_eq!(titles_in(&store, col.id).await, vec![("second".to_string(), 0)]);

        let restored = TaskStore::restore(&store, first.id).await.unwrap();
        assert_eq!(restored.position, 1);
        assert!(restored.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_reorder_rejects_foreign_ids() {
        let store = MemoryStore::new();
        let (_, board_id) = seed_board(&store).await;
        let a = column(&store, board_id, "A").await;
        let err = ColumnStore::reorder(&store, board_id, &[a.id, Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_second_running_timer_conflicts() {
        let store = MemoryStore::new();
        let (task_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        let new_entry = || NewTimeEntry {
            task_id,
            user_id,
            started_at: Utc::now(),
            ended_at: None,
            duration_minutes: None,
            description: None,
        };
        TimeEntryStore::create(&store, new_entry()).await.unwrap();
        let err = TimeEntryStore::create(&store, new_entry()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_tag_names_unique_per_scope() {
        let store = MemoryStore::new();
        let project_id = Uuid::new_v4();
        let tag = |project_id: Option<Uuid>| NewTag {
            project_id,
            name: "Bug".to_string(),
            color: "#ff0000".to_string(),
        };
        TagStore::create(&store, tag(None)).await.unwrap();
        TagStore::create(&store, tag(Some(project_id))).await.unwrap();
        let err = TagStore::create(&store, tag(Some(project_id))).await.unwrap_err();
        assert!(err.is_conflict());

        assert_eq!(TagStore::list(&store, None).await.unwrap().len(), 1);
        assert_eq!(TagStore::list(&store, Some(project_id)).await.unwrap().len(), 2);
    }
}
