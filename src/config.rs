//! 运行配置
//!
//! 先读可选的 `autopost.toml`，再用环境变量覆盖，最后落到默认值。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, ConfigError, FileError};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "autopost.toml";

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据目录（档案、历史、草稿、日报、锁）
    pub data_dir: PathBuf,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 目标站点（同源请求的 origin）
    pub site_base_url: String,
    /// 公开 JSON 接口的 base URL
    pub public_api_base_url: String,
    // --- LLM 配置 ---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 时序 ---
    /// 获取 CSRF token 的等待上限（秒）
    pub token_wait_secs: u64,
    /// 等待发帖接口结果的上限（秒）
    pub submit_wait_secs: u64,
    /// 发帖后验证前的等待（秒）
    pub verify_delay_secs: u64,
    /// 单次内容生成的超时（秒）
    pub generation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("memory"),
            browser_debug_port: 9222,
            site_base_url: "https://www.reddit.com".to_string(),
            public_api_base_url: "https://www.reddit.com".to_string(),
            llm_api_key: None,
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            token_wait_secs: 3,
            submit_wait_secs: 5,
            verify_delay_secs: 60,
            generation_timeout_secs: 180,
        }
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选）→ 环境变量覆盖
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("AUTOPOST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let base = Self::from_toml_file(Path::new(&path))?;
        base.with_env_overrides()
    }

    /// 从 TOML 文件读取；文件不存在时返回默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            debug!("配置文件 {} 不存在，使用默认配置", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        toml::from_str(&content).map_err(|e| {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source: e,
            })
        })
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(mut self) -> AppResult<Self> {
        if let Ok(v) = std::env::var("AUTOPOST_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(port) = parse_env("BROWSER_DEBUG_PORT", "u16")? {
            self.browser_debug_port = port;
        }
        if let Ok(v) = std::env::var("SITE_BASE_URL") {
            self.site_base_url = v;
        }
        if let Ok(v) = std::env::var("PUBLIC_API_BASE_URL") {
            self.public_api_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            if !v.trim().is_empty() {
                self.llm_api_key = Some(v.trim().to_string());
            }
        }
        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Some(secs) = parse_env("VERIFY_DELAY_SECS", "u64")? {
            self.verify_delay_secs = secs;
        }
        Ok(self)
    }

    // ========== 数据目录布局 ==========

    /// LLM key 文件路径
    pub fn llm_key_file(&self) -> PathBuf {
        self.data_dir.join(".llm_key")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("subreddit-profiles.json")
    }

    pub fn product_config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("posted-log.json")
    }

    pub fn drafts_dir(&self) -> PathBuf {
        self.data_dir.join("drafts")
    }

    /// 自动化相关文件（配置、日报、锁）所在目录
    pub fn automation_dir(&self) -> PathBuf {
        self.data_dir.join("automation")
    }

    pub fn automation_config_path(&self) -> PathBuf {
        self.data_dir.join("automation-config.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.automation_dir().join(".lock")
    }

    /// 解析 LLM API Key：环境变量 / 配置文件优先，其次 key 文件
    pub fn resolve_llm_api_key(&self) -> AppResult<String> {
        if let Some(key) = self.llm_api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        let key_file = self.llm_key_file();
        match std::fs::read_to_string(&key_file) {
            Ok(content) if !content.trim().is_empty() => Ok(content.trim().to_string()),
            Ok(_) => Err(missing_credentials(&key_file)),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("读取 key 文件失败 {}: {}", key_file.display(), e);
                }
                Err(missing_credentials(&key_file))
            }
        }
    }

    pub fn token_wait(&self) -> Duration {
        Duration::from_secs(self.token_wait_secs)
    }

    pub fn submit_wait(&self) -> Duration {
        Duration::from_secs(self.submit_wait_secs)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_secs(self.verify_delay_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

fn missing_credentials(key_file: &Path) -> AppError {
    AppError::Config(ConfigError::CredentialsMissing {
        key_file: key_file.display().to_string(),
    })
}

fn parse_env<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            AppError::Config(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            })
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_toml_file_yields_defaults() {
        let config = Config::from_toml_file(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("memory"));
        assert_eq!(config.verify_delay(), Duration::from_secs(60));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autopost.toml");
        std::fs::write(&path, "browser_debug_port = 2001\nsubmit_wait_secs = 8\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.browser_debug_port, 2001);
        assert_eq!(config.submit_wait_secs, 8);
        assert_eq!(config.site_base_url, "https://www.reddit.com");
    }

    #[test]
    fn key_file_is_used_when_no_key_configured() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        assert!(config.resolve_llm_api_key().unwrap_err().is_config());

        std::fs::write(config.llm_key_file(), "sk-test\n").unwrap();
        assert_eq!(config.resolve_llm_api_key().unwrap(), "sk-test");
    }
}
