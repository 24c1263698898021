use std::collections::HashSet;

use db::models::{
    board::{Board, NewBoard, SeedColumn, UpdateBoardData},
    column::Column,
    user::User,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    ServiceContext,
    error::ServiceError,
    events::EventKind,
    permissions::Permission,
    validation::{BOARD_NAME_MAX, DESCRIPTION_MAX, Validator, normalize_optional},
};

/// Title and color of the columns a new board starts with.
pub const DEFAULT_COLUMNS: [(&str, &str); 4] = [
    ("К выполнению", "#6b7280"),
    ("В работе", "#3b82f6"),
    ("На проверке", "#f59e0b"),
    ("Выполнено", "#10b981"),
];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBoard {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub create_default_columns: bool,
}

impl CreateBoard {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("name", &self.name, BOARD_NAME_MAX)
            .optional_text("description", self.description.as_deref(), DESCRIPTION_MAX);
        v.finish()
    }
}

fn validate_update(data: &UpdateBoardData) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    if let Some(name) = &data.name {
        v.required_text("name", name, BOARD_NAME_MAX);
    }
    if let Some(Some(description)) = &data.description {
        v.optional_text("description", Some(description), DESCRIPTION_MAX);
    }
    v.finish()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<Uuid>,
}

/// Board with the columns created alongside it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BoardWithColumns {
    #[serde(flatten)]
    pub board: Board,
    pub columns: Vec<Column>,
}

pub(crate) fn board_not_found() -> ServiceError {
    ServiceError::not_found("BOARD_NOT_FOUND", "Доска не найдена")
}

pub(crate) fn reorder_mismatch() -> ServiceError {
    ServiceError::unprocessable(
        "REORDER_MISMATCH",
        "Список должен содержать все элементы ровно один раз",
    )
}

/// `requested` must be a permutation of `current`.
pub(crate) fn ensure_permutation(requested: &[Uuid], current: &[Uuid]) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    v.id_list("ids", requested);
    v.finish()?;

    let requested_set: HashSet<&Uuid> = requested.iter().collect();
    let current_set: HashSet<&Uuid> = current.iter().collect();
    if requested.len() != current.len() || requested_set != current_set {
        return Err(reorder_mismatch());
    }
    Ok(())
}

/// Live board by id, going through the board cache.
pub(crate) async fn load_board(ctx: &ServiceContext, id: Uuid) -> Result<Board, ServiceError> {
    let boards = ctx.stores.boards.clone();
    ctx.caches()
        .boards
        .get_or_try_insert_with(id, || async move {
            boards.find_by_id(id, false).await?.ok_or_else(board_not_found)
        })
        .await
}

#[derive(Clone)]
pub struct BoardService {
    ctx: ServiceContext,
}

impl BoardService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, actor: &User, project_id: Uuid) -> Result<Vec<Board>, ServiceError> {
        self.ctx
            .access
            .require(actor, project_id, Permission::ViewProject)
            .await?;
        Ok(self.ctx.stores.boards.list_by_project(project_id).await?)
    }

    #[instrument(name = "boards.create", skip(self, actor, req), fields(actor_id = %actor.id, project_id = %req.project_id))]
    pub async fn create(
        &self,
        actor: &User,
        req: CreateBoard,
    ) -> Result<BoardWithColumns, ServiceError> {
        self.ctx
            .access
            .require(actor, req.project_id, Permission::ManageBoards)
            .await?;
        req.validate()?;

        let defaults = if req.create_default_columns {
            &DEFAULT_COLUMNS[..]
        } else {
            &DEFAULT_COLUMNS[..1]
        };
        let seeds = defaults
            .iter()
            .map(|(title, color)| SeedColumn {
                title: title.to_string(),
                color: color.to_string(),
            })
            .collect();

        let (board, columns) = self
            .ctx
            .stores
            .boards
            .create_with_columns(
                NewBoard {
                    project_id: req.project_id,
                    name: req.name.trim().to_string(),
                    description: normalize_optional(req.description),
                    created_by: Some(actor.id),
                },
                seeds,
            )
            .await?;

        info!(board_id = %board.id, columns = columns.len(), "board created");
        self.ctx.events.emit(
            EventKind::BoardCreated,
            Some(board.project_id),
            board.id,
            actor.id,
        );
        Ok(BoardWithColumns { board, columns })
    }

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<Board, ServiceError> {
        let board = load_board(&self.ctx, id).await?;
        self.ctx
            .access
            .require(actor, board.project_id, Permission::ViewProject)
            .await?;
        Ok(board)
    }

    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        mut data: UpdateBoardData,
    ) -> Result<Board, ServiceError> {
        let board = load_board(&self.ctx, id).await?;
        self.ctx
            .access
            .require(actor, board.project_id, Permission::ManageBoards)
            .await?;
        validate_update(&data)?;
        data.name = data.name.map(|n| n.trim().to_string());
        data.description = data.description.map(normalize_optional);

        let board = self.ctx.stores.boards.update(id, data).await?;
        self.ctx.caches().boards.invalidate(&id);
        self.ctx
            .events
            .emit(EventKind::BoardUpdated, Some(board.project_id), id, actor.id);
        Ok(board)
    }

    /// Boards still holding live tasks cannot be deleted.
    #[instrument(name = "boards.delete", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        let board = load_board(&self.ctx, id).await?;
        self.ctx
            .access
            .require(actor, board.project_id, Permission::ManageBoards)
            .await?;

        let tasks = self.ctx.stores.tasks.count_in_board(id).await?;
        if tasks > 0 {
            return Err(ServiceError::conflict(
                "BOARD_HAS_TASKS",
                format!("Нельзя удалить доску с задачами ({tasks})"),
            ));
        }

        self.ctx.stores.boards.soft_delete(id).await?;
        self.ctx.caches().invalidate_project_boards(board.project_id);
        self.ctx
            .events
            .emit(EventKind::BoardDeleted, Some(board.project_id), id, actor.id);
        Ok(())
    }

    pub async fn restore(&self, actor: &User, id: Uuid) -> Result<Board, ServiceError> {
        let board = self
            .ctx
            .stores
            .boards
            .find_by_id(id, true)
            .await?
            .ok_or_else(board_not_found)?;
        self.ctx
            .access
            .require(actor, board.project_id, Permission::ManageBoards)
            .await?;
        if board.deleted_at.is_none() {
            return Ok(board);
        }

        let board = self.ctx.stores.boards.restore(id).await?;
        self.ctx.caches().invalidate_project_boards(board.project_id);
        self.ctx
            .events
            .emit(EventKind::BoardRestored, Some(board.project_id), id, actor.id);
        Ok(board)
    }

    pub async fn reorder(
        &self,
        actor: &User,
        project_id: Uuid,
        ids: Vec<Uuid>,
    ) -> Result<Vec<Board>, ServiceError> {
        self.ctx
            .access
            .require(actor, project_id, Permission::ManageBoards)
            .await?;
        let current: Vec<Uuid> = self
            .ctx
            .stores
            .boards
            .list_by_project(project_id)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        ensure_permutation(&ids, &current)?;

        let boards = self
            .ctx
            .stores
            .boards
            .reorder(project_id, &ids)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::NotFound { .. } => reorder_mismatch(),
                other => other,
            })?;
        self.ctx.caches().invalidate_project_boards(project_id);
        self.ctx
            .events
            .emit(EventKind::BoardsReordered, Some(project_id), project_id, actor.id);
        Ok(boards)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use db::models::project::{Project, ProjectRole};

    use super::*;
    use crate::services::{
        Services,
        projects::tests::{add, create_project},
        test_support::{register, services, services_cached},
    };

    pub(crate) async fn create_board(
        services: &Services,
        actor: &User,
        project: &Project,
        name: &str,
    ) -> BoardWithColumns {
        services
            .boards
            .create(
                actor,
                CreateBoard {
                    project_id: project.id,
                    name: name.to_string(),
                    description: None,
                    create_default_columns: true,
                },
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_ensure_permutation() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(ensure_permutation(&[b, a], &[a, b]).is_ok());
        assert_eq!(
            ensure_permutation(&[a], &[a, b]).unwrap_err().code(),
            "REORDER_MISMATCH"
        );
        assert_eq!(
            ensure_permutation(&[a, c], &[a, b]).unwrap_err().code(),
            "REORDER_MISMATCH"
        );
        assert_eq!(
            ensure_permutation(&[a, a], &[a, b]).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_create_board_with_default_columns() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;

        let created = create_board(&services, &admin, &project, "Sprint").await;
        let titles: Vec<_> = created.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["К выполнению", "В работе", "На проверке", "Выполнено"]);
        assert_eq!(
            created.columns.iter().map(|c| c.position).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        let bare = services
            .boards
            .create(
                &admin,
                CreateBoard {
                    project_id: project.id,
                    name: "Bare".to_string(),
                    description: None,
                    create_default_columns: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(bare.columns.len(), 1);
        assert_eq!(bare.board.position, 1);
    }

    #[tokio::test]
    async fn test_members_cannot_manage_boards() {
        let services = services();
        register(&services, "Admin").await;
        let alice = register(&services, "Alice").await;
        let bob = register(&services, "Bob").await;
        let project = create_project(&services, &alice, "P").await;
        add(&services, &project, &alice, &bob, ProjectRole::Member).await;

        let err = services
            .boards
            .create(
                &bob,
                CreateBoard {
                    project_id: project.id,
                    name: "Nope".to_string(),
                    description: None,
                    create_default_columns: true,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSIONS");

        let board = create_board(&services, &alice, &project, "Ok").await;
        assert!(services.boards.get(&bob, board.board.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_reorder_boards() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let first = create_board(&services, &admin, &project, "First").await.board;
        let second = create_board(&services, &admin, &project, "Second").await.board;

        let reordered = services
            .boards
            .reorder(&admin, project.id, vec![second.id, first.id])
            .await
            .unwrap();
        assert_eq!(reordered[0].id, second.id);
        assert_eq!(reordered[0].position, 0);
        assert_eq!(reordered[1].id, first.id);

        let err = services
            .boards
            .reorder(&admin, project.id, vec![first.id])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "REORDER_MISMATCH");
    }

    #[tokio::test]
    async fn test_delete_and_restore_board() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let first = create_board(&services, &admin, &project, "First").await.board;
        let second = create_board(&services, &admin, &project, "Second").await.board;

        services.boards.delete(&admin, first.id).await.unwrap();
        let live = services.boards.list(&admin, project.id).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!((live[0].id, live[0].position), (second.id, 0));
        assert_eq!(
            services.boards.get(&admin, first.id).await.unwrap_err().code(),
            "BOARD_NOT_FOUND"
        );

        let restored = services.boards.restore(&admin, first.id).await.unwrap();
        assert_eq!(restored.position, 1);
    }

    #[tokio::test]
    async fn test_cached_sibling_sees_compacted_position_after_delete() {
        let services = services_cached();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let first = create_board(&services, &admin, &project, "First").await.board;
        let second = create_board(&services, &admin, &project, "Second").await.board;
        let warm = services.boards.get(&admin, second.id).await.unwrap();
        assert_eq!(warm.position, 1);

        services.boards.delete(&admin, first.id).await.unwrap();

        let cached = services.boards.get(&admin, second.id).await.unwrap();
        let listed = services.boards.list(&admin, project.id).await.unwrap();
        assert_eq!(cached.position, 0);
        assert_eq!((listed[0].id, listed[0].position), (second.id, cached.position));

        let restored = services.boards.restore(&admin, first.id).await.unwrap();
        let reloaded = services.boards.get(&admin, first.id).await.unwrap();
        assert_eq!(reloaded.position, restored.position);
    }

    #[tokio::test]
    async fn test_cached_boards_follow_reorder() {
        let services = services_cached();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let first = create_board(&services, &admin, &project, "First").await.board;
        let second = create_board(&services, &admin, &project, "Second").await.board;
        services.boards.get(&admin, first.id).await.unwrap();
        services.boards.get(&admin, second.id).await.unwrap();

        services
            .boards
            .reorder(&admin, project.id, vec![second.id, first.id])
            .await
            .unwrap();

        let second = services.boards.get(&admin, second.id).await.unwrap();
        let first = services.boards.get(&admin, first.id).await.unwrap();
        assert_eq!((second.position, first.position), (0, 1));
    }

    #[tokio::test]
    async fn test_deleted_board_is_gone_from_cache() {
        let services = services_cached();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let board = create_board(&services, &admin, &project, "Doomed").await.board;
        services.boards.get(&admin, board.id).await.unwrap();

        services.boards.delete(&admin, board.id).await.unwrap();

        assert_eq!(
            services.boards.get(&admin, board.id).await.unwrap_err().code(),
            "BOARD_NOT_FOUND"
        );
    }
}
