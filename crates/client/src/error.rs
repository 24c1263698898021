use thiserror::Error;

/// Code the server uses when the CSRF pair is missing or stale.
pub const CSRF_TOKEN_INVALID: &str = "CSRF_TOKEN_INVALID";

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Превышено время ожидания ответа сервера")]
    Timeout,
    #[error("Не удалось подключиться к серверу: {0}")]
    Connect(String),
    #[error("Ошибка сети: {0}")]
    Transport(String),
    #[error("Некорректный ответ сервера: {0}")]
    Decode(String),
    #[error("Не удалось создать HTTP-клиент: {0}")]
    Build(String),
}

impl ClientError {
    /// Rate limits, server failures and network hiccups are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout | Self::Connect(_) => true,
            Self::Transport(_) | Self::Decode(_) | Self::Build(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub(crate) fn is_csrf_rejection(&self) -> bool {
        matches!(self, Self::Api { status: 403, code, .. } if code == CSRF_TOKEN_INVALID)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// User-facing text for a status when the server sent none.
pub fn status_message(status: u16) -> String {
    match status {
        400 => "Некорректный запрос".to_string(),
        401 => "Сессия истекла. Пожалуйста, войдите снова".to_string(),
        403 => "Недостаточно прав для выполнения операции".to_string(),
        404 => "Запрашиваемый ресурс не найден".to_string(),
        409 => "Конфликт данных: такой объект уже существует".to_string(),
        422 => "Проверьте правильность введённых данных".to_string(),
        429 => "Слишком много запросов. Попробуйте позже".to_string(),
        500..=599 => "Ошибка сервера. Попробуйте позже".to_string(),
        other => format!("Ошибка запроса (HTTP {other})"),
    }
}
