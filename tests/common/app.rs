use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use o2o_analytics_backend::cache::SledCache;
use o2o_analytics_backend::config::{
    CacheConfig, Config, RateLimitConfig, ThresholdConfig, WorkerConfig,
};
use o2o_analytics_backend::engine::{AnalyticsEngine, EngineConfig};
use o2o_analytics_backend::routes::build_router;
use o2o_analytics_backend::state::AppState;
use o2o_analytics_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

async fn spawn_with_limits(api_limit: u64) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("analytics-test.sled");

    // 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        trust_proxy: false,
        business_timezone: chrono_tz::Asia::Shanghai,
        rate_limit: RateLimitConfig {
            window_secs: 60,
            max_requests: api_limit,
        },
        cache: CacheConfig { ttl_secs: 3600 },
        thresholds: ThresholdConfig::default(),
        worker: WorkerConfig {
            is_leader: false,
            enable_cache_warm: false,
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let cache = Arc::new(SledCache::new(&store));
    let engine = Arc::new(
        AnalyticsEngine::new(store.clone(), cache, EngineConfig::from_config(&config))
            .expect("engine"),
    );
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, engine, &config, shutdown_tx);

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with_limits(1000).await
}

pub async fn spawn_test_app_with_rate_limit(api_limit: u64) -> TestApp {
    spawn_with_limits(api_limit).await
}
