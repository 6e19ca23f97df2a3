//! 订单聚合：把一单多行的明细表折叠成每单一行。
//!
//! 核心不变式：订单级字段取 first，商品级字段求和。
//! 反过来用会静默产出错误但看似正常的报表，是本引擎历史上
//! 后果最严重的一类缺陷，聚合规则只允许从 `crate::schema` 的
//! 分类表推导。

use std::collections::BTreeMap;

use crate::engine::types::{rate_pct, MarketingBreakdown, OrderAggregate};
use crate::store::operations::order_lines::OrderLine;

/// 聚合过程中的数据质量计数：只记录不拒绝
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationWarnings {
    /// 名义上订单级的字段在同一订单内出现了不同值的订单数。
    /// 输入数据质量假设被打破时记警告，first 值仍然生效，报表可算。
    pub inconsistent_orders: u64,
}

/// 纯函数：输入行集，输出每订单一行的聚合。
/// 行集须已按调用方的过滤条件筛过；分组键是订单号。
/// 返回顺序按订单号稳定排序，保证相同输入产出字节一致的结果。
pub fn aggregate_orders(lines: &[OrderLine]) -> (Vec<OrderAggregate>, AggregationWarnings) {
    let mut groups: BTreeMap<&str, Vec<&OrderLine>> = BTreeMap::new();
    for line in lines {
        groups.entry(line.order_id.as_str()).or_default().push(line);
    }

    let mut warnings = AggregationWarnings::default();
    let mut aggregates = Vec::with_capacity(groups.len());

    for (order_id, group) in groups {
        let first = group[0];

        if !order_level_fields_consistent(&group) {
            warnings.inconsistent_orders += 1;
            tracing::warn!(
                order_id,
                lines = group.len(),
                "Order-level field varies across lines of one order, using first value"
            );
        }

        // 距离允许个别行缺失，取第一处非空值
        let delivery_distance = group.iter().find_map(|line| line.delivery_distance);

        let mut marketing = MarketingBreakdown::default();
        let mut total_revenue = 0.0;
        let mut total_profit = 0.0;
        let mut total_fee_alloc = 0.0;
        let mut item_count = 0.0;
        for line in &group {
            marketing.accumulate(line);
            total_revenue += line.item_revenue;
            total_profit += line.item_profit;
            total_fee_alloc += line.item_fee_alloc;
            item_count += line.quantity;
        }
        let total_marketing = marketing.total();

        aggregates.push(OrderAggregate {
            order_id: order_id.to_string(),
            store: first.store.clone(),
            channel: first.channel.clone(),
            ts: first.ts,
            delivery_fee: first.delivery_fee,
            platform_fee: first.platform_fee,
            delivery_distance,
            franchise_type: first.franchise_type.clone(),
            total_revenue,
            total_profit,
            total_fee_alloc,
            marketing,
            total_marketing,
            item_count,
            line_count: group.len() as u64,
            profit_rate: rate_pct(total_profit, total_revenue),
        });
    }

    (aggregates, warnings)
}

fn order_level_fields_consistent(group: &[&OrderLine]) -> bool {
    let first = group[0];
    group.iter().skip(1).all(|line| {
        line.delivery_fee.to_bits() == first.delivery_fee.to_bits()
            && line.platform_fee.to_bits() == first.platform_fee.to_bits()
            && line.franchise_type == first.franchise_type
    })
}
