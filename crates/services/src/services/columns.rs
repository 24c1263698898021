use db::models::{
    board::Board,
    column::{Column, NewColumn, UpdateColumnData},
    user::User,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    ServiceContext,
    boards::{ensure_permutation, load_board, reorder_mismatch},
    error::ServiceError,
    events::EventKind,
    permissions::Permission,
    validation::{COLUMN_TITLE_MAX, Validator, WIP_LIMIT_MAX},
};

pub const DEFAULT_COLUMN_COLOR: &str = "#6b7280";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateColumn {
    pub board_id: Uuid,
    pub title: String,
    pub color: Option<String>,
    pub wip_limit: Option<i32>,
}

impl CreateColumn {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("title", &self.title, COLUMN_TITLE_MAX);
        if let Some(color) = &self.color {
            v.color("color", color);
        }
        if let Some(limit) = self.wip_limit {
            v.int_range("wip_limit", limit.into(), 1, WIP_LIMIT_MAX);
        }
        v.finish()
    }
}

fn validate_update(data: &UpdateColumnData) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    if let Some(title) = &data.title {
        v.required_text("title", title, COLUMN_TITLE_MAX);
    }
    if let Some(color) = &data.color {
        v.color("color", color);
    }
    if let Some(Some(limit)) = data.wip_limit {
        v.int_range("wip_limit", limit.into(), 1, WIP_LIMIT_MAX);
    }
    v.finish()
}

pub(crate) fn column_not_found() -> ServiceError {
    ServiceError::not_found("COLUMN_NOT_FOUND", "Колонка не найдена")
}

fn same_title(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Live column by id.
pub(crate) async fn load_column(ctx: &ServiceContext, id: Uuid) -> Result<Column, ServiceError> {
    ctx.stores
        .columns
        .find_by_id(id, false)
        .await?
        .ok_or_else(column_not_found)
}

#[derive(Clone)]
pub struct ColumnService {
    ctx: ServiceContext,
}

impl ColumnService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn board_for(
        &self,
        actor: &User,
        board_id: Uuid,
        permission: Permission,
    ) -> Result<Board, ServiceError> {
        let board = load_board(&self.ctx, board_id).await?;
        self.ctx
            .access
            .require(actor, board.project_id, permission)
            .await?;
        Ok(board)
    }

    async fn ensure_unique_title(
        &self,
        board_id: Uuid,
        title: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let columns = self.ctx.stores.columns.list_by_board(board_id).await?;
        if columns
            .iter()
            .any(|c| Some(c.id) != except && same_title(&c.title, title))
        {
            return Err(ServiceError::conflict(
                "COLUMN_TITLE_EXISTS",
                "Колонка с таким названием уже существует на этой доске",
            ));
        }
        Ok(())
    }

    pub async fn list(&self, actor: &User, board_id: Uuid) -> Result<Vec<Column>, ServiceError> {
        self.board_for(actor, board_id, Permission::ViewProject)
            .await?;
        Ok(self.ctx.stores.columns.list_by_board(board_id).await?)
    }

    #[instrument(name = "columns.create", skip(self, actor, req), fields(actor_id = %actor.id, board_id = %req.board_id))]
    pub async fn create(&self, actor: &User, req: CreateColumn) -> Result<Column, ServiceError> {
        let board = self
            .board_for(actor, req.board_id, Permission::ManageBoards)
            .await?;
        req.validate()?;
        self.ensure_unique_title(board.id, &req.title, None).await?;

        let column = self
            .ctx
            .stores
            .columns
            .create(NewColumn {
                board_id: board.id,
                title: req.title.trim().to_string(),
                color: req
                    .color
                    .map(|c| c.trim().to_string())
                    .unwrap_or_else(|| DEFAULT_COLUMN_COLOR.to_string()),
                wip_limit: req.wip_limit,
                created_by: Some(actor.id),
            })
            .await?;
        self.ctx.events.emit(
            EventKind::ColumnCreated,
            Some(board.project_id),
            column.id,
            actor.id,
        );
        Ok(column)
    }

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<Column, ServiceError> {
        let column = load_column(&self.ctx, id).await?;
        self.board_for(actor, column.board_id, Permission::ViewProject)
            .await?;
        Ok(column)
    }

    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        mut data: UpdateColumnData,
    ) -> Result<Column, ServiceError> {
        let column = load_column(&self.ctx, id).await?;
        let board = self
            .board_for(actor, column.board_id, Permission::ManageBoards)
            .await?;
        validate_update(&data)?;
        if let Some(title) = &data.title {
            self.ensure_unique_title(board.id, title, Some(id)).await?;
        }
        data.title = data.title.map(|t| t.trim().to_string());
        data.color = data.color.map(|c| c.trim().to_string());

        let column = self.ctx.stores.columns.update(id, data).await?;
        self.ctx.events.emit(
            EventKind::ColumnUpdated,
            Some(board.project_id),
            id,
            actor.id,
        );
        Ok(column)
    }

    /// The last live column of a board is kept; so is any column with tasks.
    #[instrument(name = "columns.delete", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        let column = load_column(&self.ctx, id).await?;
        let board = self
            .board_for(actor, column.board_id, Permission::ManageBoards)
            .await?;

        let siblings = self.ctx.stores.columns.list_by_board(board.id).await?;
        if siblings.len() <= 1 {
            return Err(ServiceError::unprocessable(
                "LAST_COLUMN",
                "Нельзя удалить последнюю колонку доски",
            ));
        }
        let tasks = self.ctx.stores.tasks.count_in_column(id).await?;
        if tasks > 0 {
            return Err(ServiceError::conflict(
                "COLUMN_HAS_TASKS",
                format!("Нельзя удалить колонку с задачами ({tasks})"),
            ));
        }

        self.ctx.stores.columns.soft_delete(id).await?;
        info!(column_id = %id, board_id = %board.id, "column deleted");
        self.ctx.events.emit(
            EventKind::ColumnDeleted,
            Some(board.project_id),
            id,
            actor.id,
        );
        Ok(())
    }

    pub async fn reorder(
        &self,
        actor: &User,
        board_id: Uuid,
        ids: Vec<Uuid>,
    ) -> Result<Vec<Column>, ServiceError> {
        let board = self
            .board_for(actor, board_id, Permission::ManageBoards)
            .await?;
        let current: Vec<Uuid> = self
            .ctx
            .stores
            .columns
            .list_by_board(board_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        ensure_permutation(&ids, &current)?;

        let columns = self
            .ctx
            .stores
            .columns
            .reorder(board_id, &ids)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::NotFound { .. } => reorder_mismatch(),
                other => other,
            })?;
        self.ctx.events.emit(
            EventKind::ColumnsReordered,
            Some(board.project_id),
            board_id,
            actor.id,
        );
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        boards::{CreateBoard, tests::create_board},
        projects::tests::create_project,
        test_support::{register, services},
    };

    fn column(board_id: Uuid, title: &str) -> CreateColumn {
        CreateColumn {
            board_id,
            title: title.to_string(),
            color: None,
            wip_limit: None,
        }
    }

    #[test]
    fn test_same_title_is_case_insensitive() {
        assert!(same_title(" В работе ", "в РАБОТЕ"));
        assert!(!same_title("Todo", "Done"));
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let board = create_board(&services, &admin, &project, "B").await.board;

        let err = services
            .columns
            .create(&admin, column(board.id, "  в работе "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "COLUMN_TITLE_EXISTS");

        let created = services
            .columns
            .create(&admin, column(board.id, "Archive"))
            .await
            .unwrap();
        assert_eq!(created.position, 4);
        assert_eq!(created.color, DEFAULT_COLUMN_COLOR);

        let err = services
            .columns
            .update(
                &admin,
                created.id,
                UpdateColumnData {
                    title: Some("Выполнено".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "COLUMN_TITLE_EXISTS");

        let renamed = services
            .columns
            .update(
                &admin,
                created.id,
                UpdateColumnData {
                    title: Some("ARCHIVE".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "ARCHIVE");
    }

    #[tokio::test]
    async fn test_last_column_cannot_be_deleted() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let created = services
            .boards
            .create(
                &admin,
                CreateBoard {
                    project_id: project.id,
                    name: "Solo".to_string(),
                    description: None,
                    create_default_columns: false,
                },
            )
            .await
            .unwrap();

        let err = services
            .columns
            .delete(&admin, created.columns[0].id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LAST_COLUMN");
        assert!(matches!(err, ServiceError::Unprocessable { .. }));
    }

    #[tokio::test]
    async fn test_delete_compacts_positions() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let created = create_board(&services, &admin, &project, "B").await;

        services
            .columns
            .delete(&admin, created.columns[1].id)
            .await
            .unwrap();
        let columns = services
            .columns
            .list(&admin, created.board.id)
            .await
            .unwrap();
        assert_eq!(
            columns.iter().map(|c| c.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(
            services
                .columns
                .get(&admin, created.columns[1].id)
                .await
                .unwrap_err()
                .code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_wip_limit_validation() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let board = create_board(&services, &admin, &project, "B").await.board;

        let err = services
            .columns
            .create(
                &admin,
                CreateColumn {
                    wip_limit: Some(0),
                    ..column(board.id, "Zero")
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_reorder_columns() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let created = create_board(&services, &admin, &project, "B").await;
        let mut ids: Vec<Uuid> = created.columns.iter().map(|c| c.id).collect();
        ids.reverse();

        let columns = services
            .columns
            .reorder(&admin, created.board.id, ids.clone())
            .await
            .unwrap();
        assert_eq!(columns.iter().map(|c| c.id).collect::<Vec<_>>(), ids);

        ids.pop();
        let err = services
            .columns
            .reorder(&admin, created.board.id, ids)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "REORDER_MISMATCH");
    }
}
