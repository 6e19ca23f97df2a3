//! 缓存清理（每 10 分钟）。
//! 过期判定在读路径已经做了，这里只负责回收空间，
//! 单次运行限制删除数量，不让清理扫描拖慢正常读写。

use crate::engine::AnalyticsEngine;

/// 单次清理最多删除的条目数
const MAX_REMOVALS_PER_RUN: u64 = 10_000;

pub async fn run(engine: &AnalyticsEngine) {
    tracing::debug!("Diagnostics cache cleanup worker tick");

    match engine
        .cache()
        .purge_expired(chrono::Utc::now(), MAX_REMOVALS_PER_RUN)
    {
        Ok(removed) if removed >= MAX_REMOVALS_PER_RUN => {
            tracing::info!(
                removed,
                "Cache cleanup: reached single-run limit, remaining items deferred to next run"
            );
        }
        Ok(removed) if removed > 0 => {
            tracing::info!(removed, "Cache cleanup: removed expired diagnostics entries");
        }
        Ok(_) => {}
        Err(error) => {
            tracing::warn!(%error, "Cache cleanup failed");
        }
    }
}
