//! 配送距离分段诊断。
//!
//! 距离域固定切成 7 个左闭右开区间，最后一段开放到正无穷。
//! 渲染层依赖固定长度数组：空输入也返回全部 7 段（零值），
//! 绝不省略任何一段。

use serde::{Deserialize, Serialize};

use crate::constants::{DISTANCE_BAND_COUNT, DISTANCE_BAND_EDGES};
use crate::engine::types::{rate_pct, safe_div, OrderAggregate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceBand {
    pub label: String,
    pub min_km: f64,
    /// 最后一段无上界
    pub max_km: Option<f64>,
    pub order_count: u64,
    pub revenue: f64,
    pub profit: f64,
    pub profit_rate: f64,
    pub delivery_cost: f64,
    pub delivery_cost_rate: f64,
    pub avg_order_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceSummary {
    pub total_orders: u64,
    pub avg_distance: f64,
    /// 有单的分段中利润率最高者的标签；并列取更短距离段；无单则为空
    pub optimal_distance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceAnalysis {
    pub bands: Vec<DistanceBand>,
    pub summary: DistanceSummary,
}

fn band_label(index: usize) -> String {
    if index == DISTANCE_BAND_COUNT - 1 {
        format!("{}km以上", DISTANCE_BAND_EDGES[index] as i64)
    } else {
        format!(
            "{}-{}km",
            DISTANCE_BAND_EDGES[index] as i64,
            DISTANCE_BAND_EDGES[index + 1] as i64
        )
    }
}

/// 距离 d 所属分段：min <= d < max，边界值归下闭的一段。
/// 未匹配到任何段（理论上只剩 NaN / 负值）回落到最后一段。
fn band_index(distance: f64) -> usize {
    for index in 0..DISTANCE_BAND_COUNT - 1 {
        if distance >= DISTANCE_BAND_EDGES[index] && distance < DISTANCE_BAND_EDGES[index + 1] {
            return index;
        }
    }
    if distance >= DISTANCE_BAND_EDGES[DISTANCE_BAND_COUNT - 1] {
        return DISTANCE_BAND_COUNT - 1;
    }
    DISTANCE_BAND_COUNT - 1
}

/// 纯函数：订单聚合 -> 距离分段视图。
/// 距离为空的订单按 0 处理（空值置零策略，与数值强转一致）。
pub fn distance_analysis(orders: &[OrderAggregate]) -> DistanceAnalysis {
    struct Acc {
        order_count: u64,
        revenue: f64,
        profit: f64,
        delivery_cost: f64,
    }
    let mut buckets: Vec<Acc> = (0..DISTANCE_BAND_COUNT)
        .map(|_| Acc {
            order_count: 0,
            revenue: 0.0,
            profit: 0.0,
            delivery_cost: 0.0,
        })
        .collect();

    let mut distance_sum = 0.0;
    for order in orders {
        let distance = order.delivery_distance.unwrap_or(0.0);
        distance_sum += distance;
        let acc = &mut buckets[band_index(distance)];
        acc.order_count += 1;
        acc.revenue += order.total_revenue;
        acc.profit += order.total_profit;
        acc.delivery_cost += order.delivery_fee;
    }

    let bands: Vec<DistanceBand> = buckets
        .into_iter()
        .enumerate()
        .map(|(index, acc)| DistanceBand {
            label: band_label(index),
            min_km: DISTANCE_BAND_EDGES[index],
            max_km: if index == DISTANCE_BAND_COUNT - 1 {
                None
            } else {
                Some(DISTANCE_BAND_EDGES[index + 1])
            },
            order_count: acc.order_count,
            revenue: acc.revenue,
            profit: acc.profit,
            profit_rate: rate_pct(acc.profit, acc.revenue),
            delivery_cost: acc.delivery_cost,
            delivery_cost_rate: rate_pct(acc.delivery_cost, acc.revenue),
            avg_order_value: safe_div(acc.revenue, acc.order_count as f64),
        })
        .collect();

    // 并列时取更短距离段：严格大于才更新
    let mut optimal: Option<&DistanceBand> = None;
    for band in bands.iter().filter(|b| b.order_count > 0) {
        match optimal {
            Some(best) if band.profit_rate <= best.profit_rate => {}
            _ => optimal = Some(band),
        }
    }

    let total_orders: u64 = bands.iter().map(|b| b.order_count).sum();
    let summary = DistanceSummary {
        total_orders,
        avg_distance: safe_div(distance_sum, orders.len() as f64),
        optimal_distance: optimal.map(|b| b.label.clone()),
    };

    DistanceAnalysis { bands, summary }
}
