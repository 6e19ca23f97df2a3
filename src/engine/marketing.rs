//! 营销费用结构与趋势。
//!
//! 八个营销子字段全部是商品级字段（sum），概念上像「订单促销」
//! 但物理上按行存储 —— 这里只消费聚合结果，规则由 schema 保证。

use std::collections::BTreeMap;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::engine::types::{marketing_label, rate_pct, safe_div, MarketingBreakdown, OrderAggregate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMarketing {
    pub channel: String,
    pub order_count: u64,
    pub fields: MarketingBreakdown,
    pub total_marketing_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingSummary {
    pub total_marketing_cost: f64,
    pub revenue: f64,
    /// 营销费用率（百分比）= 营销费用 / 营收 × 100
    pub marketing_cost_rate: f64,
    pub order_count: u64,
    pub avg_marketing_per_order: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingStructure {
    pub channels: Vec<ChannelMarketing>,
    pub summary: MarketingSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSeries {
    pub name: String,
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingTrend {
    pub dates: Vec<String>,
    /// 绝对值视图：八个类型全保留，零值不剔除
    pub series: Vec<TrendSeries>,
    /// 百分比堆叠视图：整个区间恒为零的类型被剔除
    pub percentage_series: Vec<TrendSeries>,
    /// 每日营销费用合计
    pub totals: Vec<f64>,
}

/// 渠道维度的营销费用结构
pub fn marketing_structure(orders: &[OrderAggregate]) -> MarketingStructure {
    let mut by_channel: BTreeMap<&str, (u64, MarketingBreakdown)> = BTreeMap::new();
    let mut revenue = 0.0;

    for order in orders {
        let entry = by_channel
            .entry(order.channel.as_str())
            .or_insert_with(|| (0, MarketingBreakdown::default()));
        entry.0 += 1;
        entry.1.add(&order.marketing);
        revenue += order.total_revenue;
    }

    let channels: Vec<ChannelMarketing> = by_channel
        .into_iter()
        .map(|(channel, (order_count, fields))| {
            let total_marketing_cost = fields.total();
            ChannelMarketing {
                channel: channel.to_string(),
                order_count,
                fields,
                total_marketing_cost,
            }
        })
        .collect();

    let total_marketing_cost: f64 = channels.iter().map(|c| c.total_marketing_cost).sum();
    let order_count = orders.len() as u64;

    MarketingStructure {
        summary: MarketingSummary {
            total_marketing_cost,
            revenue,
            marketing_cost_rate: rate_pct(total_marketing_cost, revenue),
            order_count,
            avg_marketing_per_order: safe_div(total_marketing_cost, order_count as f64),
        },
        channels,
    }
}

/// 日期维度的营销费用趋势。区间内每一天都出现（零值保留）；
/// 百分比视图剔除整个区间恒为零的类型 —— 没有占比的类型
/// 不应在 100% 堆叠图里占图例位置。
pub fn marketing_trend(
    orders: &[OrderAggregate],
    range: (NaiveDate, NaiveDate),
    tz: Tz,
) -> MarketingTrend {
    let (start, end) = range;
    let mut dates = Vec::new();
    let mut day = start;
    while day <= end {
        dates.push(day);
        day += chrono::Duration::days(1);
    }

    let mut daily: BTreeMap<NaiveDate, MarketingBreakdown> = dates
        .iter()
        .map(|d| (*d, MarketingBreakdown::default()))
        .collect();

    for order in orders {
        let local_date = order.ts.with_timezone(&tz).date_naive();
        if let Some(acc) = daily.get_mut(&local_date) {
            acc.add(&order.marketing);
        }
    }

    let per_day: Vec<&MarketingBreakdown> = dates.iter().map(|d| &daily[d]).collect();
    let totals: Vec<f64> = per_day.iter().map(|b| b.total()).collect();

    let mut series = Vec::new();
    let mut percentage_series = Vec::new();
    let field_count = per_day
        .first()
        .map(|b| b.as_pairs().len())
        .unwrap_or(crate::constants::MARKETING_FIELD_COUNT);

    for field_index in 0..field_count {
        let mut name = "";
        let values: Vec<f64> = per_day
            .iter()
            .map(|breakdown| {
                let (field_name, value) = breakdown.as_pairs()[field_index];
                name = field_name;
                value
            })
            .collect();

        if per_day.is_empty() {
            name = crate::schema::MARKETING_FIELDS[field_index];
        }

        let all_zero = values.iter().all(|v| *v == 0.0);

        if !all_zero {
            let pct_values: Vec<f64> = values
                .iter()
                .zip(&totals)
                .map(|(value, total)| rate_pct(*value, *total))
                .collect();
            percentage_series.push(TrendSeries {
                name: name.to_string(),
                label: marketing_label(name).to_string(),
                values: pct_values,
            });
        }

        series.push(TrendSeries {
            name: name.to_string(),
            label: marketing_label(name).to_string(),
            values,
        });
    }

    MarketingTrend {
        dates: dates.iter().map(|d| d.to_string()).collect(),
        series,
        percentage_series,
        totals,
    }
}
