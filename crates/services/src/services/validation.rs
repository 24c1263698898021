//! Field-level validation shared by every create/update payload.
//!
//! Lengths are counted in characters after trimming.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use utils::response::FieldError;
use uuid::Uuid;

use super::error::ServiceError;

pub const EMAIL_MAX: usize = 255;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;
pub const USER_NAME_MAX: usize = 100;
pub const AVATAR_URL_MAX: usize = 500;
pub const PROJECT_NAME_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 1000;
pub const ICON_MAX: usize = 50;
pub const BOARD_NAME_MAX: usize = 100;
pub const COLUMN_TITLE_MAX: usize = 50;
pub const WIP_LIMIT_MAX: i64 = 1000;
pub const TASK_TITLE_MAX: usize = 200;
pub const TASK_DESCRIPTION_MAX: usize = 10_000;
pub const ESTIMATED_HOURS_MAX: f64 = 10_000.0;
pub const COMMENT_MAX: usize = 5000;
pub const TAG_NAME_MAX: usize = 50;
pub const FILE_NAME_MAX: usize = 255;
pub const FILE_SIZE_MAX: i64 = 52_428_800;
pub const MIME_TYPE_MAX: usize = 127;
pub const TIME_ENTRY_MINUTES_MAX: i64 = 1440;
pub const TIME_ENTRY_DESCRIPTION_MAX: usize = 500;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|_| unreachable!())
});

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap_or_else(|_| unreachable!()));

/// Accumulates field errors; `finish` turns a non-empty set into
/// [`ServiceError::Validation`].
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(FieldError::new(field, message));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Non-blank text of at most `max` characters.
    pub fn required_text(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        let len = value.trim().chars().count();
        if len == 0 {
            self.push(field, "Поле обязательно для заполнения");
        } else if len > max {
            self.push(field, format!("Максимальная длина {max} символов"));
        }
        self
    }

    pub fn optional_text(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(value) = value
            && value.trim().chars().count() > max
        {
            self.push(field, format!("Максимальная длина {max} символов"));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        let value = value.trim();
        if value.is_empty() {
            self.push(field, "Email обязателен");
        } else if value.chars().count() > EMAIL_MAX {
            self.push(field, format!("Максимальная длина {EMAIL_MAX} символов"));
        } else if !EMAIL_RE.is_match(value) {
            self.push(field, "Некорректный формат email");
        }
        self
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        let len = value.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
            self.push(
                field,
                format!("Пароль должен содержать от {PASSWORD_MIN} до {PASSWORD_MAX} символов"),
            );
        }
        self
    }

    pub fn color(&mut self, field: &str, value: &str) -> &mut Self {
        if !COLOR_RE.is_match(value.trim()) {
            self.push(field, "Цвет должен быть в формате #RRGGBB");
        }
        self
    }

    pub fn int_range(&mut self, field: &str, value: i64, min: i64, max: i64) -> &mut Self {
        if !(min..=max).contains(&value) {
            self.push(field, format!("Значение должно быть от {min} до {max}"));
        }
        self
    }

    pub fn float_range(&mut self, field: &str, value: f64, min: f64, max: f64) -> &mut Self {
        if !value.is_finite() || value < min || value > max {
            self.push(field, format!("Значение должно быть от {min} до {max}"));
        }
        self
    }

    pub fn file_name(&mut self, field: &str, value: &str) -> &mut Self {
        self.required_text(field, value, FILE_NAME_MAX);
        if value.contains(['/', '\\']) || value.trim() == ".." {
            self.push(field, "Имя файла не должно содержать разделителей пути");
        }
        self
    }

    /// Non-empty list without duplicates.
    pub fn id_list(&mut self, field: &str, ids: &[Uuid]) -> &mut Self {
        if ids.is_empty() {
            self.push(field, "Список не может быть пустым");
        } else {
            let unique: HashSet<&Uuid> = ids.iter().collect();
            if unique.len() != ids.len() {
                self.push(field, "Список содержит повторяющиеся идентификаторы");
            }
        }
        self
    }

    pub fn finish(self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::validation(self.errors))
        }
    }
}

/// Trimmed copy of an optional text field, with blank treated as absent.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
