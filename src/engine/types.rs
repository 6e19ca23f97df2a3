use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::MARKETING_FIELDS;
use crate::store::operations::order_lines::OrderLine;

/// 比率（百分比）：分母不为正时恒为 0，绝不产生 NaN/Inf
pub fn rate_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

/// 均值：分母为 0 时恒为 0
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// 八个营销费用子字段的订单级合计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingBreakdown {
    pub delivery_fee_waiver: f64,
    pub threshold_discount: f64,
    pub item_discount: f64,
    pub merchant_voucher: f64,
    pub shared_voucher: f64,
    pub gift_amount: f64,
    pub other_discount: f64,
    pub new_customer_discount: f64,
}

impl MarketingBreakdown {
    pub fn accumulate(&mut self, line: &OrderLine) {
        self.delivery_fee_waiver += line.delivery_fee_waiver;
        self.threshold_discount += line.threshold_discount;
        self.item_discount += line.item_discount;
        self.merchant_voucher += line.merchant_voucher;
        self.shared_voucher += line.shared_voucher;
        self.gift_amount += line.gift_amount;
        self.other_discount += line.other_discount;
        self.new_customer_discount += line.new_customer_discount;
    }

    pub fn add(&mut self, other: &MarketingBreakdown) {
        self.delivery_fee_waiver += other.delivery_fee_waiver;
        self.threshold_discount += other.threshold_discount;
        self.item_discount += other.item_discount;
        self.merchant_voucher += other.merchant_voucher;
        self.shared_voucher += other.shared_voucher;
        self.gift_amount += other.gift_amount;
        self.other_discount += other.other_discount;
        self.new_customer_discount += other.new_customer_discount;
    }

    pub fn total(&self) -> f64 {
        self.as_pairs().iter().map(|(_, v)| v).sum()
    }

    /// (字段名, 值) 列表，顺序与 `schema::MARKETING_FIELDS` 一致
    pub fn as_pairs(&self) -> [(&'static str, f64); 8] {
        [
            (MARKETING_FIELDS[0], self.delivery_fee_waiver),
            (MARKETING_FIELDS[1], self.threshold_discount),
            (MARKETING_FIELDS[2], self.item_discount),
            (MARKETING_FIELDS[3], self.merchant_voucher),
            (MARKETING_FIELDS[4], self.shared_voucher),
            (MARKETING_FIELDS[5], self.gift_amount),
            (MARKETING_FIELDS[6], self.other_discount),
            (MARKETING_FIELDS[7], self.new_customer_discount),
        ]
    }
}

/// 字段名对应的图例文案（渲染层直接展示）
pub fn marketing_label(field: &str) -> &'static str {
    match field {
        "delivery_fee_waiver" => "配送费减免",
        "threshold_discount" => "满减优惠",
        "item_discount" => "商品折扣",
        "merchant_voucher" => "商家代金券",
        "shared_voucher" => "共担代金券",
        "gift_amount" => "赠品金额",
        "other_discount" => "其他商家优惠",
        "new_customer_discount" => "新客立减",
        _ => "未知",
    }
}

/// 订单级聚合结果：每个订单号一行。瞬态视图，按请求重算、由缓存兜底，
/// 从不落库。比率只在聚合完成后计算，绝不在明细行上算。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAggregate {
    pub order_id: String,
    pub store: String,
    pub channel: String,
    pub ts: DateTime<Utc>,

    // 订单级字段（first）
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub delivery_distance: Option<f64>,
    pub franchise_type: String,

    // 商品级字段（sum）
    pub total_revenue: f64,
    pub total_profit: f64,
    pub total_fee_alloc: f64,
    pub marketing: MarketingBreakdown,
    pub total_marketing: f64,
    pub item_count: f64,
    pub line_count: u64,

    /// 利润率（百分比），营收为 0 时为 0
    pub profit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_pct_never_divides_by_zero() {
        assert_eq!(rate_pct(10.0, 0.0), 0.0);
        assert_eq!(rate_pct(10.0, -5.0), 0.0);
        assert!((rate_pct(25.0, 100.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn marketing_total_sums_all_eight() {
        let breakdown = MarketingBreakdown {
            delivery_fee_waiver: 1.0,
            threshold_discount: 2.0,
            item_discount: 3.0,
            merchant_voucher: 4.0,
            shared_voucher: 5.0,
            gift_amount: 6.0,
            other_discount: 7.0,
            new_customer_discount: 8.0,
        };
        assert!((breakdown.total() - 36.0).abs() < 1e-9);
        assert_eq!(breakdown.as_pairs().len(), 8);
    }

    #[test]
    fn every_marketing_field_has_a_label() {
        for field in MARKETING_FIELDS {
            assert_ne!(marketing_label(field), "未知");
        }
    }
}
