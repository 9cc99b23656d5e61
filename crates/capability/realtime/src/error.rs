//! 连接层错误。

/// 设备升级请求被拒绝的原因；`Display` 即返回给设备的纯文本。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Missing auth")]
    MissingCredentials,
    #[error("Location not found")]
    UnknownLocation,
    #[error("Forbidden")]
    Forbidden,
    #[error("Internal error")]
    Directory(String),
}

impl GatewayError {
    /// 对应的 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingCredentials => 401,
            Self::Forbidden => 403,
            Self::UnknownLocation => 404,
            Self::Directory(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordingError {
    #[error("agent offline")]
    AgentOffline,
    #[error("agent busy")]
    AgentBusy,
    #[error("command not delivered")]
    Undelivered,
}

impl RecordingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentOffline => "AGENT.OFFLINE",
            Self::AgentBusy => "AGENT.BUSY",
            Self::Undelivered => "AGENT.UNREACHABLE",
        }
    }
}
