//! PostgreSQL implementations of the store traits.
//!
//! Queries are checked at runtime (`sqlx::query_as::<_, T>`) so the crate
//! builds without a live database or offline query data.

mod attachments;
mod boards;
mod columns;
mod comments;
mod projects;
mod sessions;
mod tags;
mod tasks;
mod time_entries;
mod users;

pub use attachments::PgAttachmentRepository;
pub use boards::PgBoardRepository;
pub use columns::PgColumnRepository;
pub use comments::PgCommentRepository;
pub use projects::PgProjectRepository;
pub use sessions::PgSessionRepository;
pub use tags::PgTagRepository;
pub use tasks::PgTaskRepository;
pub use time_entries::PgTimeEntryRepository;
pub use users::PgUserRepository;

use sqlx::{Postgres, Transaction};

pub(crate) type Tx<'a> = Transaction<'a, Postgres>;

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
