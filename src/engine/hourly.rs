//! 分时利润诊断：24 小时固定分桶 + 高峰时段识别。
//!
//! 小时按业务时区解释，不是 UTC —— 时区是显式配置，
//! 整个系统的时间分桶都用同一个值。

use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{HOURS_PER_DAY, PEAK_STDDEV_FACTOR};
use crate::engine::types::{safe_div, OrderAggregate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakPeriod {
    pub name: String,
    pub start_hour: u32,
    /// 含端点：11-14 表示 11:00 至 14:59
    pub end_hour: u32,
    pub order_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyProfit {
    /// 固定 0..24，渲染层依赖长度 24
    pub hours: Vec<u32>,
    pub orders: Vec<u64>,
    pub revenues: Vec<f64>,
    pub profits: Vec<f64>,
    /// 每小时单均利润，无单小时为 0
    pub avg_profits: Vec<f64>,
    pub peak_periods: Vec<PeakPeriod>,
}

/// 纯函数：订单聚合 -> 24 小时视图
pub fn hourly_profit(orders: &[OrderAggregate], tz: Tz) -> HourlyProfit {
    let mut counts = vec![0u64; HOURS_PER_DAY];
    let mut revenues = vec![0.0f64; HOURS_PER_DAY];
    let mut profits = vec![0.0f64; HOURS_PER_DAY];

    for order in orders {
        let hour = order.ts.with_timezone(&tz).hour() as usize;
        counts[hour] += 1;
        revenues[hour] += order.total_revenue;
        profits[hour] += order.total_profit;
    }

    let avg_profits: Vec<f64> = (0..HOURS_PER_DAY)
        .map(|h| safe_div(profits[h], counts[h] as f64))
        .collect();

    let peak_periods = detect_peak_periods(&counts);

    HourlyProfit {
        hours: (0..HOURS_PER_DAY as u32).collect(),
        orders: counts,
        revenues,
        profits,
        avg_profits,
        peak_periods,
    }
}

/// 高峰判定：order_count > mean + 0.5σ（总体标准差）。
/// 相邻高峰小时合并成一个时段，按中点小时命名。
fn detect_peak_periods(counts: &[u64]) -> Vec<PeakPeriod> {
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<u64>() as f64 / n;
    let variance = counts
        .iter()
        .map(|c| {
            let diff = *c as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    let threshold = mean + PEAK_STDDEV_FACTOR * variance.sqrt();

    let mut periods = Vec::new();
    let mut run_start: Option<usize> = None;

    for hour in 0..=counts.len() {
        let is_peak = hour < counts.len() && counts[hour] as f64 > threshold;
        match (run_start, is_peak) {
            (None, true) => run_start = Some(hour),
            (Some(start), false) => {
                let end = hour - 1;
                let order_count: u64 = counts[start..=end].iter().sum();
                periods.push(PeakPeriod {
                    name: period_name(start, end).to_string(),
                    start_hour: start as u32,
                    end_hour: end as u32,
                    order_count,
                });
                run_start = None;
            }
            _ => {}
        }
    }

    periods
}

/// 按时段中点命名
fn period_name(start: usize, end: usize) -> &'static str {
    let midpoint = (start + end) / 2;
    match midpoint {
        5..=9 => "早高峰",
        10..=14 => "午高峰",
        15..=16 => "下午时段",
        17..=20 => "晚高峰",
        _ => "夜间时段",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;
    use crate::engine::types::MarketingBreakdown;

    fn order_at_hour(order_id: &str, utc_hour: u32, profit: f64) -> OrderAggregate {
        OrderAggregate {
            order_id: order_id.to_string(),
            store: "门店A".to_string(),
            channel: "美团".to_string(),
            ts: Utc.with_ymd_and_hms(2024, 3, 10, utc_hour, 30, 0).unwrap(),
            delivery_fee: 4.0,
            platform_fee: 2.0,
            delivery_distance: Some(1.0),
            franchise_type: "直营".to_string(),
            total_revenue: profit * 4.0,
            total_profit: profit,
            total_fee_alloc: 0.0,
            marketing: MarketingBreakdown::default(),
            total_marketing: 0.0,
            item_count: 1.0,
            line_count: 1,
            profit_rate: 25.0,
        }
    }

    #[test]
    fn buckets_use_business_timezone_not_utc() {
        // UTC 04:30 = 上海 12:30
        let orders = vec![order_at_hour("o1", 4, 10.0)];
        let view = hourly_profit(&orders, chrono_tz::Asia::Shanghai);
        assert_eq!(view.orders[12], 1);
        assert_eq!(view.orders[4], 0);
    }

    #[test]
    fn always_returns_24_hours() {
        let view = hourly_profit(&[], chrono_tz::Asia::Shanghai);
        assert_eq!(view.hours.len(), 24);
        assert_eq!(view.orders.len(), 24);
        assert_eq!(view.avg_profits.len(), 24);
        assert!(view.peak_periods.is_empty());
    }

    #[test]
    fn avg_profit_is_zero_for_empty_hours() {
        let orders = vec![order_at_hour("o1", 4, 10.0)];
        let view = hourly_profit(&orders, chrono_tz::Asia::Shanghai);
        assert_eq!(view.avg_profits[0], 0.0);
        assert!((view.avg_profits[12] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn contiguous_peak_hours_merge_into_one_period() {
        // 上海 11/12/13 点各 10 单，其余零散
        let mut orders = Vec::new();
        let mut id = 0;
        for utc_hour in [3u32, 4, 5] {
            for _ in 0..10 {
                orders.push(order_at_hour(&format!("o{id}"), utc_hour, 5.0));
                id += 1;
            }
        }
        orders.push(order_at_hour("ox", 12, 5.0)); // 上海 20 点 1 单

        let view = hourly_profit(&orders, chrono_tz::Asia::Shanghai);
        assert_eq!(view.peak_periods.len(), 1);
        let peak = &view.peak_periods[0];
        assert_eq!(peak.start_hour, 11);
        assert_eq!(peak.end_hour, 13);
        assert_eq!(peak.name, "午高峰");
        assert_eq!(peak.order_count, 30);
    }

    #[test]
    fn uniform_day_has_no_peaks() {
        let mut orders = Vec::new();
        for hour in 0..24 {
            orders.push(order_at_hour(&format!("o{hour}"), hour, 5.0));
        }
        let view = hourly_profit(&orders, chrono_tz::UTC);
        assert!(view.peak_periods.is_empty());
    }

    #[test]
    fn order_count_is_conserved_across_hours() {
        let orders: Vec<OrderAggregate> = (0..50)
            .map(|i| order_at_hour(&format!("o{i}"), (i % 24) as u32, 5.0))
            .collect();
        let view = hourly_profit(&orders, chrono_tz::Asia::Shanghai);
        let total: u64 = view.orders.iter().sum();
        assert_eq!(total, 50);
    }
}
