//! 异常订单检测：低利润 / 高配送费 / 负利润。
//!
//! 三类不互斥，一单可以同时出现在多个列表里。
//! 负利润与低利润按符号区分，不按幅度。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::engine::types::{safe_div, OrderAggregate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalousOrder {
    pub order_id: String,
    pub store: String,
    pub channel: String,
    pub ts: DateTime<Utc>,
    pub revenue: f64,
    pub profit: f64,
    pub profit_rate: f64,
    pub delivery_fee: f64,
    /// 配送费 / 营收，营收为 0 时为 0
    pub delivery_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySummary {
    pub total_orders: u64,
    /// 负利润订单的亏损合计，报告为正数
    pub total_loss: f64,
    pub low_profit_ratio: f64,
    pub high_delivery_ratio: f64,
    pub negative_profit_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub low_profit: Vec<AnomalousOrder>,
    pub high_delivery: Vec<AnomalousOrder>,
    pub negative_profit: Vec<AnomalousOrder>,
    pub summary: AnomalySummary,
}

fn describe(order: &OrderAggregate) -> AnomalousOrder {
    AnomalousOrder {
        order_id: order.order_id.clone(),
        store: order.store.clone(),
        channel: order.channel.clone(),
        ts: order.ts,
        revenue: order.total_revenue,
        profit: order.total_profit,
        profit_rate: order.profit_rate,
        delivery_fee: order.delivery_fee,
        delivery_ratio: safe_div(order.delivery_fee, order.total_revenue),
    }
}

/// 纯函数：订单聚合 -> 异常报告，阈值来自配置
pub fn anomalies(orders: &[OrderAggregate], thresholds: &ThresholdConfig) -> AnomalyReport {
    let mut low_profit = Vec::new();
    let mut high_delivery = Vec::new();
    let mut negative_profit = Vec::new();
    let mut total_loss = 0.0;

    for order in orders {
        // 低利润：不亏但不健康（0 <= 利润率 < 阈值）
        if order.total_profit >= 0.0 && order.profit_rate < thresholds.low_profit_rate_pct {
            low_profit.push(describe(order));
        }
        if order.total_revenue > 0.0
            && order.delivery_fee / order.total_revenue > thresholds.high_delivery_ratio
        {
            high_delivery.push(describe(order));
        }
        if order.total_profit < 0.0 {
            total_loss += -order.total_profit;
            negative_profit.push(describe(order));
        }
    }

    let total = orders.len() as f64;
    let summary = AnomalySummary {
        total_orders: orders.len() as u64,
        total_loss,
        low_profit_ratio: safe_div(low_profit.len() as f64, total),
        high_delivery_ratio: safe_div(high_delivery.len() as f64, total),
        negative_profit_ratio: safe_div(negative_profit.len() as f64, total),
    };

    AnomalyReport {
        low_profit,
        high_delivery,
        negative_profit,
        summary,
    }
}
