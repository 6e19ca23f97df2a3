use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub trust_proxy: bool,
    /// 业务时区：所有小时/日期分桶都在该时区内解释，绝不依赖系统时区
    pub business_timezone: Tz,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub thresholds: ThresholdConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

/// 诊断阈值：异常判定与环比评级的分界线都是配置，不在调用点硬编码
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// 低利润率判定线（百分比，0 到该值之间的订单计入）
    pub low_profit_rate_pct: f64,
    /// 高配送费判定线（配送费 / 营收 比值）
    pub high_delivery_ratio: f64,
    /// 评级「优秀」要求的利润率下限（百分比）
    pub rating_excellent_profit_rate: f64,
    /// 评级「良好」要求的利润率下限（百分比）
    pub rating_good_profit_rate: f64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_cache_warm: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            low_profit_rate_pct: 10.0,
            high_delivery_ratio: 0.15,
            rating_excellent_profit_rate: 20.0,
            rating_good_profit_rate: 10.0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 900,
            max_requests: 500,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            is_leader: true,
            enable_cache_warm: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/analytics.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            trust_proxy: env_or_bool("TRUST_PROXY", false),
            business_timezone: parse_timezone(&env_or("BUSINESS_TIMEZONE", "Asia/Shanghai")),
            rate_limit: RateLimitConfig {
                window_secs: env_or_parse("RATE_LIMIT_WINDOW_SECS", 900_u64),
                max_requests: env_or_parse("RATE_LIMIT_MAX", 500_u64),
            },
            cache: CacheConfig {
                ttl_secs: env_or_parse("CACHE_TTL_SECS", 3600_u64),
            },
            thresholds: ThresholdConfig {
                low_profit_rate_pct: env_or_parse("LOW_PROFIT_RATE_PCT", 10.0_f64),
                high_delivery_ratio: env_or_parse("HIGH_DELIVERY_RATIO", 0.15_f64),
                rating_excellent_profit_rate: env_or_parse(
                    "RATING_EXCELLENT_PROFIT_RATE",
                    20.0_f64,
                ),
                rating_good_profit_rate: env_or_parse("RATING_GOOD_PROFIT_RATE", 10.0_f64),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_cache_warm: env_or_bool("ENABLE_CACHE_WARM_WORKER", true),
            },
        }
    }
}

fn parse_timezone(raw: &str) -> Tz {
    match raw.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(value = %raw, "Invalid BUSINESS_TIMEZONE, using Asia/Shanghai");
            chrono_tz::Asia::Shanghai
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl fmt::Display for ThresholdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "low_profit<{}% high_delivery>{} excellent>={}% good>={}%",
            self.low_profit_rate_pct,
            self.high_delivery_ratio,
            self.rating_excellent_profit_rate,
            self.rating_good_profit_rate
        )
    }
}
