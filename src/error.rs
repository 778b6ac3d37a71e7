use std::fmt;
use std::error::Error as StdError;
use serde::{Serialize, Deserialize};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response, Json},
};

/// 服务器错误类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerError {
    /// 内部错误
    Internal(String),
    /// 无效的请求（格式错误，不可重试）
    InvalidRequest(String),
    /// 身份已被封禁
    AlreadyBanned(u64),
    /// 已在匹配队列中
    AlreadyQueued(u64),
    /// 不在匹配队列中
    NotInQueue(u64),
    /// 会话未找到
    SessionNotFound(String),
    /// 会话不处于 active 状态
    SessionNotActive(String),
    /// 不是会话参与者
    NotParticipant(u64),
    /// 存储暂时不可用（可重试）
    TransientStoreFailure(String),
    /// 外部评分服务不可用（规则引擎已兜底）
    ModerationUnavailable(String),
    /// 配置错误
    Configuration(String),
    /// 序列化错误
    Serialization(String),
    /// 超时错误
    Timeout(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ServerError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ServerError::AlreadyBanned(id) => write!(f, "Identity {} is banned", id),
            ServerError::AlreadyQueued(id) => write!(f, "Identity {} is already queued", id),
            ServerError::NotInQueue(id) => write!(f, "Identity {} is not in queue", id),
            ServerError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            ServerError::SessionNotActive(id) => write!(f, "Session not active: {}", id),
            ServerError::NotParticipant(id) => write!(f, "Identity {} is not a participant", id),
            ServerError::TransientStoreFailure(msg) => write!(f, "Transient store failure: {}", msg),
            ServerError::ModerationUnavailable(msg) => {
                write!(f, "Moderation service unavailable: {}", msg)
            }
            ServerError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ServerError::Timeout(msg) => write!(f, "Timeout error: {}", msg),
        }
    }
}

impl StdError for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::AlreadyBanned(_) | ServerError::NotParticipant(_) => StatusCode::FORBIDDEN,
            ServerError::NotInQueue(_) | ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::AlreadyQueued(_) | ServerError::SessionNotActive(_) => {
                StatusCode::CONFLICT
            }
            ServerError::TransientStoreFailure(_) | ServerError::ModerationUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ServerError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ServerError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 成功
    Success = 0,
    /// 内部错误
    Internal = 1000,
    /// 无效的请求
    InvalidRequest = 1001,
    /// 身份已被封禁
    AlreadyBanned = 2000,
    /// 已在队列中
    AlreadyQueued = 2001,
    /// 不在队列中
    NotInQueue = 2002,
    /// 会话未找到
    SessionNotFound = 3000,
    /// 会话不处于 active 状态
    SessionNotActive = 3001,
    /// 不是会话参与者
    NotParticipant = 3002,
    /// 存储暂时不可用
    TransientStoreFailure = 4000,
    /// 评分服务不可用
    ModerationUnavailable = 4001,
    /// 配置错误
    Configuration = 5000,
    /// 序列化错误
    Serialization = 5001,
    /// 超时错误
    Timeout = 5002,
}

impl From<&ServerError> for ErrorCode {
    fn from(error: &ServerError) -> Self {
        match error {
            ServerError::Internal(_) => ErrorCode::Internal,
            ServerError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ServerError::AlreadyBanned(_) => ErrorCode::AlreadyBanned,
            ServerError::AlreadyQueued(_) => ErrorCode::AlreadyQueued,
            ServerError::NotInQueue(_) => ErrorCode::NotInQueue,
            ServerError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            ServerError::SessionNotActive(_) => ErrorCode::SessionNotActive,
            ServerError::NotParticipant(_) => ErrorCode::NotParticipant,
            ServerError::TransientStoreFailure(_) => ErrorCode::TransientStoreFailure,
            ServerError::ModerationUnavailable(_) => ErrorCode::ModerationUnavailable,
            ServerError::Configuration(_) => ErrorCode::Configuration,
            ServerError::Serialization(_) => ErrorCode::Serialization,
            ServerError::Timeout(_) => ErrorCode::Timeout,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &ServerError) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.to_string(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}
