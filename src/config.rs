//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `LEXI__*` 覆盖（双下划线表示嵌套，如 `LEXI__APP__SESSION_LIMIT=12`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::session::{BuildOptions, BATCH_SIZE, NEW_ITEM_CAP};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// [app] 段：学习者、数据库位置、每次会话的词条上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// SQLite 文件路径，未设置时使用内存存储
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_session_limit")]
    pub session_limit: usize,
    /// 固定洗牌种子（测试 / 复现用），未设置时随机
    pub seed: Option<u64>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            db_path: None,
            session_limit: default_session_limit(),
            seed: None,
        }
    }
}

fn default_user_id() -> String {
    "default".to_string()
}

fn default_session_limit() -> usize {
    12
}

/// [scheduler] 段：会话构建参数
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_new_item_cap")]
    pub new_item_cap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 等级优先级，靠前的先入选
    #[serde(default = "default_level_tiers")]
    pub level_tiers: Vec<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            new_item_cap: default_new_item_cap(),
            batch_size: default_batch_size(),
            level_tiers: default_level_tiers(),
        }
    }
}

fn default_new_item_cap() -> usize {
    NEW_ITEM_CAP
}

fn default_batch_size() -> usize {
    BATCH_SIZE
}

fn default_level_tiers() -> Vec<String> {
    BuildOptions::default().level_tiers
}

/// [llm] 段：生成服务后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；没有 API Key 时退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次生成请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

impl AppConfig {
    /// 会话构建参数；未配置种子时每次取随机种子
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            new_item_cap: self.scheduler.new_item_cap,
            level_tiers: self.scheduler.level_tiers.clone(),
            batch_size: self.scheduler.batch_size.max(1),
            seed: self.app.seed.unwrap_or_else(rand::random),
        }
    }
}

/// 从 config 目录加载配置，环境变量 LEXI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 LEXI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("LEXI")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.session_limit, 12);
        assert_eq!(cfg.scheduler.batch_size, BATCH_SIZE);
        assert_eq!(cfg.scheduler.new_item_cap, NEW_ITEM_CAP);
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.build_options().level_tiers[0], "A1");
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexi.toml");
        std::fs::write(
            &path,
            r#"
[app]
user_id = "anna"
session_limit = 8
seed = 42

[scheduler]
batch_size = 3
level_tiers = ["B1", "A1"]

[llm]
provider = "mock"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.user_id, "anna");
        assert_eq!(cfg.app.session_limit, 8);
        assert_eq!(cfg.llm.provider, "mock");
        let opts = cfg.build_options();
        assert_eq!(opts.seed, 42);
        assert_eq!(opts.batch_size, 3);
        assert_eq!(opts.level_tiers, vec!["B1".to_string(), "A1".to_string()]);
        assert_eq!(opts.new_item_cap, NEW_ITEM_CAP);
    }
}
