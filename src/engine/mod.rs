//! 诊断引擎：行存查询 -> 订单聚合 -> 各诊断视图，外加缓存兜底。
//!
//! 引擎持有行存和缓存的共享引用，本身无状态；
//! 所有诊断都是「过滤 + 聚合 + 纯函数」的组合，
//! 缓存只是旁路，缓存故障降级为直接计算，不影响正确性。

pub mod aggregate;
pub mod anomaly;
pub mod compare;
pub mod distance;
pub mod hourly;
pub mod marketing;
pub mod types;

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{cache_key, AnalyticsCache, CacheEntry};
use crate::config::{Config, ThresholdConfig};
use crate::engine::aggregate::aggregate_orders;
use crate::engine::anomaly::AnomalyReport;
use crate::engine::compare::{previous_range, PeriodComparison};
use crate::engine::distance::DistanceAnalysis;
use crate::engine::hourly::HourlyProfit;
use crate::engine::marketing::{MarketingStructure, MarketingTrend};
use crate::engine::types::{rate_pct, safe_div, OrderAggregate};
use crate::schema::AggregationSchema;
use crate::store::operations::order_lines::LineFilter;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// 诊断所需的字段在当前数据集 / 请求里整体缺失。
    /// 缺列不允许静默补零出一份全零报表。
    #[error("missing required field: {field}")]
    MissingField { field: String },
    /// 字段分类表自身有错（重复分类 / 漏分类），启动期即应暴露
    #[error("aggregation policy error: {0}")]
    Policy(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 引擎运行参数，从全局配置裁剪而来
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub timezone: Tz,
    pub cache_ttl_secs: u64,
    pub thresholds: ThresholdConfig,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timezone: config.business_timezone,
            cache_ttl_secs: config.cache.ttl_secs,
            thresholds: config.thresholds.clone(),
        }
    }
}

/// 经营总览：其余诊断的公共分母
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub order_count: u64,
    pub line_count: u64,
    pub revenue: f64,
    pub profit: f64,
    pub profit_rate: f64,
    pub avg_order_value: f64,
    pub marketing_cost: f64,
    pub delivery_cost: f64,
    /// 订单级字段在同一订单内取值不一致的订单数（数据质量信号）
    pub inconsistent_orders: u64,
}

pub struct AnalyticsEngine {
    store: Arc<Store>,
    cache: Arc<dyn AnalyticsCache>,
    config: EngineConfig,
}

impl AnalyticsEngine {
    /// 构造时校验字段分类表：每个金额字段恰好归入一类。
    /// 分类表有错直接拒绝启动，不带病运行。
    pub fn new(
        store: Arc<Store>,
        cache: Arc<dyn AnalyticsCache>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        AggregationSchema::validated().map_err(|e| EngineError::Policy(e.to_string()))?;
        Ok(Self {
            store,
            cache,
            config,
        })
    }

    pub fn cache(&self) -> Arc<dyn AnalyticsCache> {
        Arc::clone(&self.cache)
    }

    pub fn timezone(&self) -> Tz {
        self.config.timezone
    }

    /// 数据变更后清空缓存。必须在写请求返回前调用；
    /// 键里带版本号，即使清空失败旧键也不会再命中。
    pub fn invalidate_cache(&self) {
        if let Err(error) = self.cache.invalidate_all() {
            tracing::warn!(%error, "Cache invalidation failed, stale keys are version-fenced");
        }
    }

    pub fn overview(&self, filter: &LineFilter) -> Result<Overview, EngineError> {
        self.cached("overview", filter, || {
            let (orders, warnings) = self.load_orders(filter)?;
            let revenue: f64 = orders.iter().map(|o| o.total_revenue).sum();
            let profit: f64 = orders.iter().map(|o| o.total_profit).sum();
            let line_count: u64 = orders.iter().map(|o| o.line_count).sum();
            Ok(Overview {
                order_count: orders.len() as u64,
                line_count,
                revenue,
                profit,
                profit_rate: rate_pct(profit, revenue),
                avg_order_value: safe_div(revenue, orders.len() as f64),
                marketing_cost: orders.iter().map(|o| o.total_marketing).sum(),
                delivery_cost: orders.iter().map(|o| o.delivery_fee).sum(),
                inconsistent_orders: warnings.inconsistent_orders,
            })
        })
    }

    pub fn distance_analysis(&self, filter: &LineFilter) -> Result<DistanceAnalysis, EngineError> {
        self.cached("distance", filter, || {
            let (orders, _) = self.load_orders(filter)?;
            // 个别订单缺距离按 0 处理，整列缺失则是上游导出配置问题
            if !orders.is_empty() && orders.iter().all(|o| o.delivery_distance.is_none()) {
                return Err(EngineError::MissingField {
                    field: "delivery_distance".to_string(),
                });
            }
            Ok(distance::distance_analysis(&orders))
        })
    }

    pub fn hourly_profit(&self, filter: &LineFilter) -> Result<HourlyProfit, EngineError> {
        self.cached("hourly", filter, || {
            let (orders, _) = self.load_orders(filter)?;
            Ok(hourly::hourly_profit(&orders, self.config.timezone))
        })
    }

    /// 环比对比必须有明确的日期区间，否则「前一区间」无定义
    pub fn compare_periods(&self, filter: &LineFilter) -> Result<PeriodComparison, EngineError> {
        let (start, end) = filter
            .resolved_range()
            .ok_or_else(|| EngineError::MissingField {
                field: "date".to_string(),
            })?;

        self.cached("compare", filter, || {
            let (current, _) = self.load_orders(filter)?;

            let (prev_start, prev_end) = previous_range(start, end);
            let previous_filter = LineFilter {
                date: None,
                start_date: Some(prev_start),
                end_date: Some(prev_end),
                ..filter.clone()
            };
            let (previous, _) = self.load_orders(&previous_filter)?;

            Ok(compare::compare_periods(
                &current,
                &previous,
                &self.config.thresholds,
            ))
        })
    }

    pub fn anomalies(&self, filter: &LineFilter) -> Result<AnomalyReport, EngineError> {
        self.cached("anomaly", filter, || {
            let (orders, _) = self.load_orders(filter)?;
            Ok(anomaly::anomalies(&orders, &self.config.thresholds))
        })
    }

    pub fn marketing_structure(
        &self,
        filter: &LineFilter,
    ) -> Result<MarketingStructure, EngineError> {
        self.cached("marketing_structure", filter, || {
            let (orders, _) = self.load_orders(filter)?;
            Ok(marketing::marketing_structure(&orders))
        })
    }

    /// 趋势区间：过滤条件给了区间用区间，没给就用数据自身的日期跨度
    pub fn marketing_trend(&self, filter: &LineFilter) -> Result<MarketingTrend, EngineError> {
        self.cached("marketing_trend", filter, || {
            let (orders, _) = self.load_orders(filter)?;

            let range = filter.resolved_range().or_else(|| {
                let dates: Vec<_> = orders
                    .iter()
                    .map(|o| o.ts.with_timezone(&self.config.timezone).date_naive())
                    .collect();
                match (dates.iter().min(), dates.iter().max()) {
                    (Some(min), Some(max)) => Some((*min, *max)),
                    _ => None,
                }
            });

            let Some(range) = range else {
                return Ok(MarketingTrend {
                    dates: Vec::new(),
                    series: Vec::new(),
                    percentage_series: Vec::new(),
                    totals: Vec::new(),
                });
            };

            Ok(marketing::marketing_trend(
                &orders,
                range,
                self.config.timezone,
            ))
        })
    }

    fn load_orders(
        &self,
        filter: &LineFilter,
    ) -> Result<(Vec<OrderAggregate>, aggregate::AggregationWarnings), EngineError> {
        let lines = self.store.query_lines(filter, self.config.timezone)?;
        Ok(aggregate_orders(&lines))
    }

    /// 缓存旁路：命中直接返回，未命中计算后回填。
    /// 读写缓存的任何故障都降级为直接计算并记警告。
    fn cached<T, F>(&self, module: &str, filter: &LineFilter, compute: F) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, EngineError>,
    {
        let version = self.store.data_version()?;
        let key = cache_key(module, &filter.cache_fragment(), version);

        match self.cache.get(&key) {
            Ok(Some(entry)) => match serde_json::from_value(entry.payload) {
                Ok(value) => {
                    tracing::debug!(module, "Diagnostics cache hit");
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(module, %error, "Cache payload shape drifted, recomputing");
                }
            },
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(module, %error, "Cache read failed, recomputing");
            }
        }

        let value = compute()?;

        match serde_json::to_value(&value) {
            Ok(payload) => {
                let entry = CacheEntry {
                    payload,
                    created_at: Utc::now(),
                    ttl_secs: self.config.cache_ttl_secs,
                };
                if let Err(error) = self.cache.set(&key, &entry) {
                    tracing::warn!(module, %error, "Cache write failed");
                }
            }
            Err(error) => {
                tracing::warn!(module, %error, "Result not cacheable");
            }
        }

        Ok(value)
    }
}
