//! Domain events fanned out to in-process subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserRegistered,
    UserLoggedIn,
    UserLoggedOut,
    UserUpdated,
    UserRoleChanged,
    UserApproved,
    UserDeleted,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    ProjectRestored,
    MemberAdded,
    MemberRoleChanged,
    MemberRemoved,
    BoardCreated,
    BoardUpdated,
    BoardDeleted,
    BoardRestored,
    BoardsReordered,
    ColumnCreated,
    ColumnUpdated,
    ColumnDeleted,
    ColumnsReordered,
    TaskCreated,
    TaskUpdated,
    TaskMoved,
    TaskDeleted,
    TaskRestored,
    TaskTagsChanged,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    TagCreated,
    TagDeleted,
    AttachmentCreated,
    AttachmentDeleted,
    TimerStarted,
    TimerStopped,
    TimeLogged,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub project_id: Option<Uuid>,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, project_id: Option<Uuid>, entity_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            kind,
            project_id,
            entity_id,
            actor_id,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Never fails; events without listeners are dropped.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn emit(&self, kind: EventKind, project_id: Option<Uuid>, entity_id: Uuid, actor_id: Uuid) {
        self.publish(DomainEvent::new(kind, project_id, entity_id, actor_id));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Logs every event at info level until the bus is dropped.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => info!(
                        target: "encore_tasks::analytics",
                        kind = %event.kind,
                        project_id = ?event.project_id,
                        entity_id = %event.entity_id,
                        actor_id = %event.actor_id,
                        "domain event"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event logger lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(EventKind::TaskCreated, None, Uuid::new_v4(), Uuid::new_v4());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let project = Uuid::new_v4();
        bus.emit(EventKind::BoardCreated, Some(project), Uuid::new_v4(), Uuid::new_v4());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::BoardCreated);
        assert_eq!(event.project_id, Some(project));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::ColumnsReordered.to_string(), "columns_reordered");
        assert_eq!(
            serde_json::to_value(EventKind::TimerStarted).unwrap(),
            "timer_started"
        );
    }

    #[tokio::test]
    async fn test_logger_stops_when_bus_dropped() {
        let bus = EventBus::new();
        let handle = bus.spawn_event_logger();
        bus.emit(EventKind::UserLoggedIn, None, Uuid::new_v4(), Uuid::new_v4());
        drop(bus);
        handle.await.unwrap();
    }
}
