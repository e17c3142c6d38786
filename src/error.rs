use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 浏览器/会话相关错误
    Browser(BrowserError),
    /// 项目存储错误
    Store(StoreError),
    /// 阶段执行错误
    Stage(StageError),
    /// 远程界面（能力适配器）错误
    Surface(SurfaceError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Browser(e) => write!(f, "浏览器错误: {}", e),
            AppError::Store(e) => write!(f, "存储错误: {}", e),
            AppError::Stage(e) => write!(f, "阶段错误: {}", e),
            AppError::Surface(e) => write!(f, "远程界面错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Browser(e) => Some(e),
            AppError::Store(e) => Some(e),
            AppError::Stage(e) => Some(e),
            AppError::Surface(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 浏览器/会话相关错误
#[derive(Debug)]
pub enum BrowserError {
    /// 启动浏览器失败
    LaunchFailed {
        session_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器配置失败
    ConfigurationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 等待元素超时
    WaitTimeout { selector: String, timeout_ms: u64 },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::LaunchFailed { session_id, source } => {
                write!(f, "启动浏览器失败 (会话: {}): {}", session_id, source)
            }
            BrowserError::ConfigurationFailed { source } => {
                write!(f, "浏览器配置失败: {}", source)
            }
            BrowserError::PageCreationFailed { source } => {
                write!(f, "创建页面失败: {}", source)
            }
            BrowserError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            BrowserError::WaitTimeout {
                selector,
                timeout_ms,
            } => {
                write!(f, "等待元素 '{}' 超时 ({}ms)", selector, timeout_ms)
            }
            BrowserError::ScriptExecutionFailed { source } => {
                write!(f, "执行脚本失败: {}", source)
            }
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrowserError::LaunchFailed { source, .. }
            | BrowserError::ConfigurationFailed { source }
            | BrowserError::PageCreationFailed { source }
            | BrowserError::NavigationFailed { source, .. }
            | BrowserError::ScriptExecutionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            BrowserError::WaitTimeout { .. } => None,
        }
    }
}

/// 项目存储错误
#[derive(Debug)]
pub enum StoreError {
    /// 项目文档不存在
    NotFound { id: String },
    /// 读取文档失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文档失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 文档损坏（JSON 解析失败），必须向上传播
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { id } => write!(f, "项目不存在: {}", id),
            StoreError::ReadFailed { path, source } => {
                write!(f, "读取项目文档失败 ({}): {}", path, source)
            }
            StoreError::WriteFailed { path, source } => {
                write!(f, "写入项目文档失败 ({}): {}", path, source)
            }
            StoreError::ParseFailed { path, source } => {
                write!(f, "项目文档损坏 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::ReadFailed { source, .. }
            | StoreError::WriteFailed { source, .. }
            | StoreError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            StoreError::NotFound { .. } => None,
        }
    }
}

/// 阶段执行错误
#[derive(Debug)]
pub enum StageError {
    /// 重试次数耗尽，携带阶段名和尝试次数重新抛出
    RetryExhausted {
        stage: String,
        attempts: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 上游输入缺失（部分写入导致）
    MissingInput { stage: String, input: String },
    /// 阶段输出解析失败
    OutputParseFailed { stage: String, detail: String },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::RetryExhausted {
                stage,
                attempts,
                source,
            } => {
                write!(f, "阶段 {} 已重试 {} 次仍失败: {}", stage, attempts, source)
            }
            StageError::MissingInput { stage, input } => {
                write!(f, "阶段 {} 缺少上游输入: {}", stage, input)
            }
            StageError::OutputParseFailed { stage, detail } => {
                write!(f, "阶段 {} 输出解析失败: {}", stage, detail)
            }
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StageError::RetryExhausted { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 远程界面（能力适配器）错误
#[derive(Debug)]
pub enum SurfaceError {
    /// 等待生成完成超时
    CompletionTimeout { surface: String, waited_secs: u64 },
    /// 界面返回空结果
    EmptyResponse { surface: String },
    /// API 调用失败（非浏览器适配器）
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 缺少登录凭据
    MissingCredentials { surface: String },
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::CompletionTimeout {
                surface,
                waited_secs,
            } => {
                write!(f, "{} 生成超时 (已等待 {}s)", surface, waited_secs)
            }
            SurfaceError::EmptyResponse { surface } => {
                write!(f, "{} 返回空结果", surface)
            }
            SurfaceError::ApiCallFailed { model, source } => {
                write!(f, "API 调用失败 (模型: {}): {}", model, source)
            }
            SurfaceError::MissingCredentials { surface } => {
                write!(f, "缺少 {} 的登录凭据", surface)
            }
        }
    }
}

impl std::error::Error for SurfaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SurfaceError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件不存在
    FileNotFound { path: String },
    /// 配置文件解析失败
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 配置项非法
    InvalidValue { field: String, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound { path } => write!(f, "配置文件不存在: {}", path),
            ConfigError::ParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
            ConfigError::InvalidValue { field, detail } => {
                write!(f, "配置项 {} 非法: {}", field, detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Store(StoreError::ParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Store(StoreError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn launch_failed(
        session_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            session_id: session_id.into(),
            source: Box::new(source),
        })
    }

    /// 创建重试耗尽错误
    pub fn retry_exhausted(
        stage: impl Into<String>,
        attempts: usize,
        source: anyhow::Error,
    ) -> Self {
        AppError::Stage(StageError::RetryExhausted {
            stage: stage.into(),
            attempts,
            source: source.into(),
        })
    }

    /// 创建上游输入缺失错误
    pub fn missing_input(stage: impl Into<String>, input: impl Into<String>) -> Self {
        AppError::Stage(StageError::MissingInput {
            stage: stage.into(),
            input: input.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
