use serde::{Deserialize, Serialize};

/// 会话开始请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartRequest {
    pub camera_id: String,
}

/// 会话开始响应数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartData {
    pub session_id: String,
}

/// 心跳请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub session_id: String,
}

/// 会话结束请求，退出信标复用同一载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStopRequest {
    pub session_id: String,
}

/// 状态码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Success = 200,
    BadRequest = 400,
    Unauthorized = 401,
    NotFound = 404,
    InternalError = 500,
    ServiceUnavailable = 503,
}

/// 统一响应包装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}
