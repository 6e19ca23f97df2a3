//! 缓存预热（每日凌晨）。
//! 看板早高峰前把「昨日经营总览」按门店算好，
//! 第一个打开看板的人不用等全量扫描。

use chrono::{Duration, Utc};

use crate::engine::AnalyticsEngine;
use crate::store::operations::order_lines::LineFilter;
use crate::store::Store;

pub async fn run(store: &Store, engine: &AnalyticsEngine) {
    let yesterday = (Utc::now().with_timezone(&engine.timezone()) - Duration::days(1)).date_naive();

    let stores = match store.distinct_stores() {
        Ok(stores) => stores,
        Err(error) => {
            tracing::warn!(%error, "Cache warm: failed to list stores");
            return;
        }
    };

    let mut warmed = 0u64;
    let mut failed = 0u64;

    // 全店视图也预热一份
    for store_name in std::iter::once(None).chain(stores.into_iter().map(Some)) {
        let filter = LineFilter {
            store: store_name.clone(),
            date: Some(yesterday),
            ..Default::default()
        };
        match engine.overview(&filter) {
            Ok(_) => warmed += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(store = ?store_name, %error, "Cache warm: overview failed");
            }
        }
    }

    tracing::info!(%yesterday, warmed, failed, "Cache warm pass finished");
}
