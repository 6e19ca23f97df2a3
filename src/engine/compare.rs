//! 环比对比：当前区间 vs 紧邻的等长前一区间。
//!
//! 前一区间没有订单时显式标记「无有效对比数据」，
//! 不报告从空基线算出来的虚假增长率。

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::engine::types::{rate_pct, safe_div, OrderAggregate};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub order_count: u64,
    pub revenue: f64,
    pub profit: f64,
    pub profit_rate: f64,
    pub avg_order_value: f64,
    pub marketing_cost: f64,
}

/// 变化量：计数/金额类是绝对差值，利润率是百分点差（不是相对增幅）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodChanges {
    pub order_count: i64,
    pub revenue: f64,
    pub profit: f64,
    pub profit_rate_pp: f64,
    pub avg_order_value: f64,
    pub marketing_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub current: PeriodMetrics,
    pub previous: PeriodMetrics,
    pub has_previous_data: bool,
    /// 无有效基线时为 None
    pub changes: Option<PeriodChanges>,
    /// 优秀 / 良好 / 需改进
    pub rating: String,
}

/// 当前区间 [start, end] 对应的前一区间：等长且紧邻
pub fn previous_range(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days = (end - start).num_days() + 1;
    (start - Duration::days(days), start - Duration::days(1))
}

pub fn period_metrics(orders: &[OrderAggregate]) -> PeriodMetrics {
    let order_count = orders.len() as u64;
    let revenue: f64 = orders.iter().map(|o| o.total_revenue).sum();
    let profit: f64 = orders.iter().map(|o| o.total_profit).sum();
    let marketing_cost: f64 = orders.iter().map(|o| o.total_marketing).sum();

    PeriodMetrics {
        order_count,
        revenue,
        profit,
        profit_rate: rate_pct(profit, revenue),
        avg_order_value: safe_div(revenue, order_count as f64),
        marketing_cost,
    }
}

pub fn compare_periods(
    current_orders: &[OrderAggregate],
    previous_orders: &[OrderAggregate],
    thresholds: &ThresholdConfig,
) -> PeriodComparison {
    let current = period_metrics(current_orders);
    let previous = period_metrics(previous_orders);
    let has_previous_data = previous.order_count > 0;

    let changes = has_previous_data.then(|| PeriodChanges {
        order_count: current.order_count as i64 - previous.order_count as i64,
        revenue: current.revenue - previous.revenue,
        profit: current.profit - previous.profit,
        profit_rate_pp: current.profit_rate - previous.profit_rate,
        avg_order_value: current.avg_order_value - previous.avg_order_value,
        marketing_cost: current.marketing_cost - previous.marketing_cost,
    });

    let order_trend_up = changes
        .as_ref()
        .map(|c| c.order_count >= 0)
        .unwrap_or(true);
    let rating = rate_period(current.profit_rate, order_trend_up, thresholds);

    PeriodComparison {
        current,
        previous,
        has_previous_data,
        changes,
        rating: rating.to_string(),
    }
}

/// 三档评级，阈值来自配置
fn rate_period(profit_rate: f64, order_trend_up: bool, thresholds: &ThresholdConfig) -> &'static str {
    if profit_rate >= thresholds.rating_excellent_profit_rate && order_trend_up {
        "优秀"
    } else if profit_rate >= thresholds.rating_good_profit_rate {
        "良好"
    } else {
        "需改进"
    }
}
