use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 公开接口调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 发帖流程错误
    #[error("发帖错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 运行锁错误
    #[error("运行锁错误: {0}")]
    Lock(#[from] LockError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 发帖历史错误
    #[error("历史记录错误: {0}")]
    History(#[from] HistoryError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器没有任何打开的窗口
    #[error("浏览器未打开任何窗口")]
    NoWindows,
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面内异步调用抛出异常
    #[error("页面脚本返回错误: {message}")]
    ScriptRejected { message: String },
    /// 等待页面内结果超时
    #[error("等待页面结果超时 ({waited_ms} ms)")]
    ResultTimeout { waited_ms: u64 },
}

/// 公开接口调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {message}")]
    RequestFailed { endpoint: String, message: String },
    /// 返回非预期状态码
    #[error("HTTP {status} ({endpoint})")]
    BadStatus { endpoint: String, status: u16 },
    /// 内容不存在（已删除或 URL 错误）
    #[error("内容不存在（已删除或 URL 错误）: {endpoint}")]
    NotFound { endpoint: String },
    /// 访问被拒绝
    #[error("访问被拒绝（可能是私密社区或已删除内容）: {endpoint}")]
    Forbidden { endpoint: String },
    /// 请求频率限制（重试次数已用尽）
    #[error("速率限制 ({endpoint})，请 {retry_after} 秒后重试")]
    RateLimited { endpoint: String, retry_after: u64 },
    /// 响应结构无法解析
    #[error("响应解析失败 ({endpoint}): {message}")]
    UnexpectedShape { endpoint: String, message: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 调用超时
    #[error("内容生成超时 ({seconds} 秒)")]
    Timeout { seconds: u64 },
}

/// 发帖流程错误
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// 浏览器控制通道不可用
    #[error("浏览器控制通道不可用: {reason}")]
    ChannelUnavailable { reason: String },
    /// 未登录（拿不到 CSRF token）
    #[error("无法获取 modhash（可能未登录）")]
    NotAuthenticated,
    /// 站点返回人机验证
    #[error("需要人工完成验证: {message}")]
    ChallengeRequired { message: String },
    /// 站点拒绝了提交
    #[error("站点拒绝发帖: {message}")]
    Rejected { message: String },
    /// 响应无法识别
    #[error("无法识别的发帖响应: {message}")]
    UnrecognizedResponse { message: String },
}

/// 运行锁错误
#[derive(Debug, Error)]
pub enum LockError {
    /// 另一个存活的进程持有锁
    #[error("另一个实例正在运行 (pid: {pid})")]
    AlreadyRunning { pid: u32 },
    /// 锁文件读写失败
    #[error("锁文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 产品配置缺失
    #[error("未找到产品配置: {path}")]
    ProductConfigMissing { path: String },
    /// 社区档案缺失
    #[error("没有社区档案: {path}")]
    ProfilesMissing { path: String },
    /// 缺少 LLM 凭证
    #[error("未找到 LLM API Key（设置 LLM_API_KEY 或写入 {key_file}）")]
    CredentialsMissing { key_file: String },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 发帖历史错误
#[derive(Debug, Error)]
pub enum HistoryError {
    /// 历史文件结构损坏，需要显式运行 repair
    #[error("发帖历史已损坏 ({path})，请运行 repair: {source}")]
    Corrupted {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// URL 无法解析出社区和帖子 ID
    #[error("无法解析帖子 URL: {url}")]
    UnparseableUrl { url: String },
    /// 帖子已存在
    #[error("帖子 {post_id} 已在记录中")]
    Duplicate { post_id: String },
    /// 记录缺少必要字段
    #[error("记录缺少必要字段: {field}")]
    MissingField { field: &'static str },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建 JSON 解析错误
    pub fn json_parse_failed(path: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::File(FileError::JsonParseFailed {
            path: path.into(),
            source,
        })
    }

    /// 是否属于"运行前就应中止"的配置类错误
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
