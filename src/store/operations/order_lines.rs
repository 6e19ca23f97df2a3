use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::import_batches::ImportBatch;
use crate::store::{Store, StoreError};

/// 订单明细行：每 SKU 一行，一单多行。
/// 订单级字段在同一订单的所有行上重复；商品级字段是该行的分摊额。
/// 字段归类见 `crate::schema`，新增金额字段必须先归类再参与聚合。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub line_id: String,
    pub batch_id: String,
    pub order_id: String,
    pub ts: DateTime<Utc>,
    pub store: String,
    pub channel: String,
    pub product_id: String,
    pub product_name: String,
    pub category_l1: String,
    pub category_l3: String,
    pub unit_price: f64,
    pub unit_cost: f64,
    pub quantity: f64,

    // 订单级字段（整单一个值，聚合取 first）
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub delivery_distance: Option<f64>,
    pub franchise_type: String,

    // 商品级字段（每行分摊，聚合求和）
    pub item_revenue: f64,
    pub item_profit: f64,
    pub item_fee_alloc: f64,
    pub delivery_fee_waiver: f64,
    pub threshold_discount: f64,
    pub item_discount: f64,
    pub merchant_voucher: f64,
    pub shared_voucher: f64,
    pub gift_amount: f64,
    pub other_discount: f64,
    pub new_customer_discount: f64,
}

impl OrderLine {
    /// 行级营销费用合计（八个子字段之和）
    pub fn marketing_total(&self) -> f64 {
        self.delivery_fee_waiver
            + self.threshold_discount
            + self.item_discount
            + self.merchant_voucher
            + self.shared_voucher
            + self.gift_amount
            + self.other_discount
            + self.new_customer_discount
    }

    /// 业务时区下的订单日期
    pub fn business_date(&self, tz: Tz) -> NaiveDate {
        self.ts.with_timezone(&tz).date_naive()
    }
}

/// 诊断查询的行级过滤条件。`start_date`/`end_date` 与 `date` 同时给出时
/// 日期区间优先（接口文档化行为，不允许歧义）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineFilter {
    pub store: Option<String>,
    pub channel: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl LineFilter {
    /// 解析生效的日期区间（闭区间）。区间形式优先于单日。
    pub fn resolved_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => self.date.map(|d| (d, d)),
        }
    }

    pub fn matches(&self, line: &OrderLine, tz: Tz) -> bool {
        if let Some(store) = &self.store {
            if &line.store != store {
                return false;
            }
        }
        if let Some(channel) = &self.channel {
            if &line.channel != channel {
                return false;
            }
        }
        if let Some((start, end)) = self.resolved_range() {
            let local = line.business_date(tz);
            if local < start || local > end {
                return false;
            }
        }
        true
    }

    /// 缓存键的规范化片段：每个影响结果的过滤参数都必须出现，
    /// 漏掉任何一个都会造成不同过滤条件之间的交叉污染。
    pub fn cache_fragment(&self) -> String {
        format!(
            "store={}|channel={}|date={}|start={}|end={}",
            self.store.as_deref().unwrap_or("*"),
            self.channel.as_deref().unwrap_or("*"),
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            self.start_date.map(|d| d.to_string()).unwrap_or_default(),
            self.end_date.map(|d| d.to_string()).unwrap_or_default(),
        )
    }
}

impl Store {
    /// 批量写入一个上传批次。全部键校验与序列化先于任何写入完成，
    /// 随后明细行、日期索引、批次元信息在同一个 sled 事务里落库：
    /// 任何一行不合法时整个批次都不写，不留下无主的孤行。
    /// 最后递增数据版本号 —— 版本号变更必须先于请求返回。
    pub fn insert_batch(
        &self,
        batch: &ImportBatch,
        lines: &[OrderLine],
    ) -> Result<u64, StoreError> {
        let mut prepared = Vec::with_capacity(lines.len());
        for line in lines {
            let key = keys::order_line_key(&line.order_id, &line.line_id)?;
            let utc_date = line.ts.format("%Y-%m-%d").to_string();
            let index_key =
                keys::line_date_index_key(&utc_date, &line.order_id, &line.line_id)?;
            prepared.push((key, index_key, Self::serialize(line)?));
        }
        let batch_key = keys::import_batch_key(&batch.id)?;
        let batch_value = Self::serialize(batch)?;

        (&self.order_lines, &self.lines_by_date, &self.import_batches)
            .transaction(|(order_lines, lines_by_date, import_batches)| {
                for (key, index_key, value) in &prepared {
                    order_lines.insert(key.as_bytes(), value.as_slice())?;
                    lines_by_date.insert(index_key.as_bytes(), key.as_bytes())?;
                }
                import_batches.insert(batch_key.as_bytes(), batch_value.as_slice())?;
                Ok::<(), ConflictableTransactionError<sled::Error>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) | TransactionError::Storage(e) => StoreError::Sled(e),
            })?;

        let version = self.bump_data_version()?;
        tracing::info!(
            batch_id = %batch.id,
            rows = lines.len(),
            data_version = version,
            "Order lines inserted"
        );
        Ok(lines.len() as u64)
    }

    /// 删除一个上传批次的所有行。边扫描边删除，完成后递增数据版本号。
    pub fn delete_batch(&self, batch_id: &str) -> Result<u64, StoreError> {
        if self.get_import_batch(batch_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "import_batch".to_string(),
                key: batch_id.to_string(),
            });
        }

        let mut removed = 0u64;
        for item in self.order_lines.iter() {
            let (key, value) = item?;
            let line: OrderLine = Self::deserialize(&value)?;
            if line.batch_id != batch_id {
                continue;
            }

            self.order_lines.remove(key.as_ref())?;
            let utc_date = line.ts.format("%Y-%m-%d").to_string();
            let index_key =
                keys::line_date_index_key(&utc_date, &line.order_id, &line.line_id)?;
            self.lines_by_date.remove(index_key.as_bytes())?;
            removed += 1;
        }

        self.remove_import_batch(batch_id)?;
        let version = self.bump_data_version()?;
        tracing::info!(batch_id, removed, data_version = version, "Batch deleted");
        Ok(removed)
    }

    /// 按过滤条件读取明细行。有日期条件时走日期索引做范围扫描；
    /// 索引按 UTC 日期存储，业务时区与 UTC 最多差一天，
    /// 因此扫描区间向两侧各扩一天，再用业务时区精确过滤。
    pub fn query_lines(&self, filter: &LineFilter, tz: Tz) -> Result<Vec<OrderLine>, StoreError> {
        let mut lines = Vec::new();

        if let Some((start, end)) = filter.resolved_range() {
            let scan_start = start - Duration::days(1);
            let scan_end = end + Duration::days(2);
            let start_key = keys::line_date_index_start(&scan_start.format("%Y-%m-%d").to_string());
            let end_key = keys::line_date_index_start(&scan_end.format("%Y-%m-%d").to_string());

            for item in self
                .lines_by_date
                .range(start_key.as_bytes()..end_key.as_bytes())
            {
                let (_, primary_key) = item?;
                let Some(raw) = self.order_lines.get(primary_key.as_ref())? else {
                    // 索引残留（删除竞态），跳过
                    continue;
                };
                let line: OrderLine = Self::deserialize(&raw)?;
                if filter.matches(&line, tz) {
                    lines.push(line);
                }
            }
        } else {
            for item in self.order_lines.iter() {
                let (_, value) = item?;
                let line: OrderLine = Self::deserialize(&value)?;
                if filter.matches(&line, tz) {
                    lines.push(line);
                }
            }
        }

        Ok(lines)
    }

    pub fn count_lines(&self) -> Result<u64, StoreError> {
        Ok(self.order_lines.len() as u64)
    }

    /// 全部出现过的门店名（cache warm worker 用）
    pub fn distinct_stores(&self) -> Result<Vec<String>, StoreError> {
        let mut stores = BTreeSet::new();
        for item in self.order_lines.iter() {
            let (_, value) = item?;
            let line: OrderLine = Self::deserialize(&value)?;
            stores.insert(line.store);
        }
        Ok(stores.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;

    fn test_line(order_id: &str, line_id: &str, ts: DateTime<Utc>) -> OrderLine {
        OrderLine {
            line_id: line_id.to_string(),
            batch_id: "b1".to_string(),
            order_id: order_id.to_string(),
            ts,
            store: "门店A".to_string(),
            channel: "美团".to_string(),
            product_id: "p1".to_string(),
            product_name: "拿铁".to_string(),
            category_l1: "咖啡".to_string(),
            category_l3: "拿铁类".to_string(),
            unit_price: 15.0,
            unit_cost: 5.0,
            quantity: 1.0,
            delivery_fee: 5.0,
            platform_fee: 3.0,
            delivery_distance: Some(2.5),
            franchise_type: "直营".to_string(),
            item_revenue: 15.0,
            item_profit: 10.0,
            item_fee_alloc: 3.0,
            delivery_fee_waiver: 0.0,
            threshold_discount: 0.0,
            item_discount: 0.0,
            merchant_voucher: 0.0,
            shared_voucher: 0.0,
            gift_amount: 0.0,
            other_discount: 0.0,
            new_customer_discount: 0.0,
        }
    }

    fn batch() -> ImportBatch {
        ImportBatch {
            id: "b1".to_string(),
            source_name: None,
            row_count: 0,
            order_count: 0,
            coerced_cells: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_bumps_data_version() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let v0 = store.data_version().unwrap();
        store
            .insert_batch(&batch(), &[test_line("o1", "l1", Utc::now())])
            .unwrap();
        assert_eq!(store.data_version().unwrap(), v0 + 1);
    }

    #[test]
    fn delete_batch_removes_lines_and_index() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store
            .insert_batch(
                &batch(),
                &[
                    test_line("o1", "l1", Utc::now()),
                    test_line("o1", "l2", Utc::now()),
                ],
            )
            .unwrap();
        assert_eq!(store.count_lines().unwrap(), 2);

        let removed = store.delete_batch("b1").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count_lines().unwrap(), 0);
        assert_eq!(store.lines_by_date.len(), 0);
        assert!(store.get_import_batch("b1").unwrap().is_none());
    }

    /// 批次里任何一行键不合法，整个批次都不落库：
    /// 不留孤行、不写批次元信息、版本号不动
    #[test]
    fn rejected_batch_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store
            .insert_batch(&batch(), &[test_line("o1", "l1", Utc::now())])
            .unwrap();
        let version_before = store.data_version().unwrap();

        let mut bad_batch = batch();
        bad_batch.id = "b2".to_string();
        let mut bad = test_line("bad:id", "l1", Utc::now());
        bad.batch_id = "b2".to_string();
        let mut good = test_line("o2", "l1", Utc::now());
        good.batch_id = "b2".to_string();

        let err = store.insert_batch(&bad_batch, &[good, bad]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert_eq!(store.count_lines().unwrap(), 1);
        assert_eq!(store.lines_by_date.len(), 1);
        assert!(store.get_import_batch("b2").unwrap().is_none());
        assert_eq!(store.data_version().unwrap(), version_before);
    }

    #[test]
    fn delete_missing_batch_is_not_found() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let err = store.delete_batch("nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn date_range_query_respects_business_timezone() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let tz = chrono_tz::Asia::Shanghai;

        // UTC 2024-03-01 20:00 = 上海 2024-03-02 04:00
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        store
            .insert_batch(&batch(), &[test_line("o1", "l1", ts)])
            .unwrap();

        let on_local_date = LineFilter {
            date: Some(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()),
            ..Default::default()
        };
        assert_eq!(store.query_lines(&on_local_date, tz).unwrap().len(), 1);

        let on_utc_date = LineFilter {
            date: Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            ..Default::default()
        };
        assert_eq!(store.query_lines(&on_utc_date, tz).unwrap().len(), 0);
    }

    #[test]
    fn range_takes_precedence_over_single_date() {
        let filter = LineFilter {
            date: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            start_date: Some(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
            end_date: Some(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()),
            ..Default::default()
        };
        assert_eq!(
            filter.resolved_range(),
            Some((
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()
            ))
        );
    }

    #[test]
    fn store_and_channel_filters_apply() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let tz = chrono_tz::Asia::Shanghai;

        let mut other = test_line("o2", "l1", Utc::now());
        other.store = "门店B".to_string();
        store
            .insert_batch(&batch(), &[test_line("o1", "l1", Utc::now()), other])
            .unwrap();

        let filter = LineFilter {
            store: Some("门店A".to_string()),
            ..Default::default()
        };
        let lines = store.query_lines(&filter, tz).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].order_id, "o1");
    }
}
