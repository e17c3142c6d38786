use std::time::Duration;

/// 程序配置文件
///
/// 每个组件使用显式类型化的配置结构，只在边界处校验一次，
/// 不在各层之间传递松散的字典。
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的项目数量
    pub max_concurrent: usize,
    /// 项目文档存放目录
    pub projects_dir: String,
    /// 下载的源视频存放目录
    pub videos_dir: String,
    /// 阶段原始响应快照存放目录
    pub outputs_dir: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 会话配置
    pub session: SessionConfig,
    /// 阶段默认重试策略
    pub retry: RetryPolicy,
    /// 视频阶段专用重试策略（结构性后置条件失败时的硬重置重试上限）
    pub video_postcondition_retries: usize,
    /// 视频时长下限（秒），0 表示关闭该检查
    pub min_duration_secs: f64,
    // --- 远程界面 URL ---
    pub gemini_url: String,
    pub flow_url: String,
    // --- Gemini 账号（浏览器登录用） ---
    pub gemini_email: String,
    pub gemini_password: String,
    // --- LLM API 配置（非浏览器文本适配器） ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 文本阶段是否走浏览器界面（false 则走 API 适配器）
    pub use_browser_for_text: bool,
}

/// 会话（浏览器）配置
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// 是否无头模式
    pub headless: bool,
    /// 单次界面操作超时
    pub op_timeout: Duration,
    /// 凭据快照存放目录（按 会话ID_域名 分文件）
    pub profiles_dir: String,
    /// 每会话隔离的 user-data-dir 根目录
    pub user_data_root: String,
    /// 自定义 Chrome 可执行文件路径（可选）
    pub chrome_executable: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            op_timeout: Duration::from_secs(30),
            profiles_dir: "data/profiles".to_string(),
            user_data_root: "data/browser_profiles".to_string(),
            chrome_executable: None,
        }
    }
}

/// 重试策略
///
/// 每个阶段可覆盖，默认 3 次、间隔 3 秒（与原批处理流程一致）。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: usize,
    /// 两次尝试之间的固定延迟
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            projects_dir: "data/projects".to_string(),
            videos_dir: "data/videos".to_string(),
            outputs_dir: "data/outputs".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            video_postcondition_retries: 2,
            min_duration_secs: 6.0,
            gemini_url: "https://gemini.google.com/app".to_string(),
            flow_url: "https://labs.google/flow".to_string(),
            gemini_email: String::new(),
            gemini_password: String::new(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4".to_string(),
            use_browser_for_text: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent: std::env::var("MAX_CONCURRENT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent),
            projects_dir: std::env::var("PROJECTS_DIR").unwrap_or(default.projects_dir),
            videos_dir: std::env::var("VIDEOS_DIR").unwrap_or(default.videos_dir),
            outputs_dir: std::env::var("OUTPUTS_DIR").unwrap_or(default.outputs_dir),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            session: SessionConfig {
                headless: std::env::var("BROWSER_HEADLESS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.session.headless),
                op_timeout: std::env::var("BROWSER_OP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default.session.op_timeout),
                profiles_dir: std::env::var("PROFILES_DIR").unwrap_or(default.session.profiles_dir),
                user_data_root: std::env::var("USER_DATA_ROOT").unwrap_or(default.session.user_data_root),
                chrome_executable: std::env::var("CHROME_EXECUTABLE").ok(),
            },
            retry: RetryPolicy {
                max_attempts: std::env::var("STAGE_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry.max_attempts),
                delay: std::env::var("STAGE_RETRY_DELAY_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default.retry.delay),
            },
            video_postcondition_retries: std::env::var("VIDEO_POSTCONDITION_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.video_postcondition_retries),
            min_duration_secs: std::env::var("MIN_DURATION_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.min_duration_secs),
            gemini_url: std::env::var("GEMINI_URL").unwrap_or(default.gemini_url),
            flow_url: std::env::var("FLOW_URL").unwrap_or(default.flow_url),
            gemini_email: std::env::var("GEMINI_EMAIL").unwrap_or(default.gemini_email),
            gemini_password: std::env::var("GEMINI_PASSWORD").unwrap_or(default.gemini_password),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            use_browser_for_text: std::env::var("USE_BROWSER_FOR_TEXT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.use_browser_for_text),
        }
    }
}
