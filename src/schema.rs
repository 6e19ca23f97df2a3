//! 字段聚合分类表。
//!
//! 订单明细表一单多行（每 SKU 一行），金额列分两类：
//! - 订单级（整单每行重复同一个值）：聚合规则 `first`
//! - 商品级（每行是该 SKU 的分摊额）：聚合规则 `sum`
//!
//! 把商品级字段误用 `first` 会静默丢掉该订单 (行数-1)/行数 的金额，
//! 产出的所有报表都是错的但看起来正常。分类表集中在这一处维护，
//! 引擎构造时校验，新字段必须先在这里分类才能参与聚合。

use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateClass {
    /// 整单一个值，取第一行
    OrderLevel,
    /// 每行分摊额，跨行求和
    ItemLevel,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub class: AggregateClass,
}

/// 订单级字段
pub const ORDER_LEVEL_FIELDS: &[&str] = &[
    "delivery_fee",
    "platform_fee",
    "delivery_distance",
    "franchise_type",
];

/// 商品级字段（含八个营销费用子字段）
pub const ITEM_LEVEL_FIELDS: &[&str] = &[
    "item_revenue",
    "item_profit",
    "item_fee_alloc",
    "quantity",
    "delivery_fee_waiver",
    "threshold_discount",
    "item_discount",
    "merchant_voucher",
    "shared_voucher",
    "gift_amount",
    "other_discount",
    "new_customer_discount",
];

/// 八个营销费用子字段，顺序即趋势图序列顺序
pub const MARKETING_FIELDS: &[&str] = &[
    "delivery_fee_waiver",
    "threshold_discount",
    "item_discount",
    "merchant_voucher",
    "shared_voucher",
    "gift_amount",
    "other_discount",
    "new_customer_discount",
];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field `{field}` classified as both order-level and item-level")]
    DoubleClassified { field: String },
    #[error("field `{field}` has no aggregation class")]
    Unclassified { field: String },
}

#[derive(Debug, Clone)]
pub struct AggregationSchema {
    specs: Vec<FieldSpec>,
}

impl AggregationSchema {
    /// 构造并校验分类表。任何字段同时出现在两类、或已知金额字段
    /// 缺少分类时立即失败，绝不猜测。
    pub fn validated() -> Result<Self, SchemaError> {
        let order: HashSet<&str> = ORDER_LEVEL_FIELDS.iter().copied().collect();
        let item: HashSet<&str> = ITEM_LEVEL_FIELDS.iter().copied().collect();

        if let Some(field) = order.intersection(&item).next() {
            return Err(SchemaError::DoubleClassified {
                field: field.to_string(),
            });
        }

        let mut specs = Vec::with_capacity(order.len() + item.len());
        for name in ORDER_LEVEL_FIELDS {
            specs.push(FieldSpec {
                name,
                class: AggregateClass::OrderLevel,
            });
        }
        for name in ITEM_LEVEL_FIELDS {
            specs.push(FieldSpec {
                name,
                class: AggregateClass::ItemLevel,
            });
        }

        let schema = Self { specs };

        // 营销子字段是最常见的回归点：概念上是「订单促销」，物理上按行存。
        // 这里强制它们全部落在 sum 一侧。
        for field in MARKETING_FIELDS {
            match schema.class_of(field) {
                Some(AggregateClass::ItemLevel) => {}
                Some(AggregateClass::OrderLevel) => {
                    return Err(SchemaError::DoubleClassified {
                        field: field.to_string(),
                    })
                }
                None => {
                    return Err(SchemaError::Unclassified {
                        field: field.to_string(),
                    })
                }
            }
        }

        Ok(schema)
    }

    pub fn class_of(&self, field: &str) -> Option<AggregateClass> {
        self.specs
            .iter()
            .find(|spec| spec.name == field)
            .map(|spec| spec.class)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.specs
    }
}
