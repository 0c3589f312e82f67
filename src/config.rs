use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cron: CronConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Bearer token for the externally scheduled batch-trigger endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 每批拉取的未聚合事件数
    #[serde(default = "default_batch_size")]
    pub aggregation_batch_size: u64,
    /// 每批拉取的未编排事件数
    #[serde(default = "default_batch_size")]
    pub orchestrator_batch_size: u64,
    /// 每次派发拉取的到期 job 数
    #[serde(default = "default_batch_size")]
    pub dispatch_batch_size: u64,
    /// drain 单次调用最多循环的批次数 (防止单个 tick 无限追赶积压)
    #[serde(default = "default_max_batches")]
    pub max_batches: u32,
    /// 内置调度循环的间隔; spawn_schedulers=false 时只依赖外部 cron 端点
    #[serde(default = "default_interval")]
    pub aggregation_interval_secs: u64,
    #[serde(default = "default_interval")]
    pub orchestrator_interval_secs: u64,
    #[serde(default = "default_interval")]
    pub dispatch_interval_secs: u64,
    #[serde(default = "default_true")]
    pub spawn_schedulers: bool,
    /// running 状态超过该秒数视为执行方已崩溃, 回收为 retrying
    #[serde(default = "default_stale_running")]
    pub stale_running_secs: i64,
    /// job 默认最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: i32,
    /// 已完全消费的原始事件保留天数, 之后由 retention 清理
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// 对第三方的出站 HTTP 超时 (到期按可重试失败处理)
    #[serde(default = "default_outbound_timeout")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> u64 {
    100
}
fn default_max_batches() -> u32 {
    10
}
fn default_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_stale_running() -> i64 {
    600
}
fn default_max_attempts() -> i32 {
    5
}
fn default_retention_days() -> i64 {
    30
}
fn default_outbound_timeout() -> u64 {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aggregation_batch_size: default_batch_size(),
            orchestrator_batch_size: default_batch_size(),
            dispatch_batch_size: default_batch_size(),
            max_batches: default_max_batches(),
            aggregation_interval_secs: default_interval(),
            orchestrator_interval_secs: default_interval(),
            dispatch_interval_secs: default_interval(),
            spawn_schedulers: default_true(),
            stale_running_secs: default_stale_running(),
            default_max_attempts: default_max_attempts(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_outbound_timeout(),
        }
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                // 有配置文件：先解析再用环境变量覆盖
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 无配置文件：使用环境变量与默认值构建
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    cron: CronConfig {
                        token: get_env("CRON_TOKEN")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                    },
                    pipeline: PipelineConfig::default(),
                    outbound: OutboundConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("CRON_TOKEN") {
            config.cron.token = v;
        }
        if let Ok(v) = env::var("OUTBOUND_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            config.outbound.timeout_secs = n;
        }
        if let Ok(v) = env::var("PIPELINE_SPAWN_SCHEDULERS")
            && let Ok(b) = v.parse()
        {
            config.pipeline.spawn_schedulers = b;
        }

        Ok(config)
    }
}
