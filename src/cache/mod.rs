//! 诊断结果缓存层。
//!
//! 显式注入的依赖（trait 对象），不是模块级单例 —— 测试可以换成
//! 确定性的内存实现。键里带数据版本号，数据变更后旧键天然失配；
//! 写操作仍会显式清空，保证读到的空间及时回收。

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::Store;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for CacheError {
    fn from(value: sled::Error) -> Self {
        CacheError::Backend(value.to_string())
    }
}

/// 缓存条目：负载 + 写入时间 + TTL。过期判定读写两侧都做，
/// 清理 worker 只负责回收空间，不承担正确性。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at).num_seconds() > self.ttl_secs as i64
    }
}

/// key = sha256(module|filters|v{data_version})，十六进制。
/// 每个影响结果的过滤参数都必须进入 `fragment`。
pub fn cache_key(module: &str, fragment: &str, data_version: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module.as_bytes());
    hasher.update(b"|");
    hasher.update(fragment.as_bytes());
    hasher.update(b"|v");
    hasher.update(data_version.to_be_bytes());
    hex::encode(hasher.finalize())
}

pub trait AnalyticsCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;
    /// 数据变更时调用，必须在写请求返回前完成
    fn invalidate_all(&self) -> Result<(), CacheError>;
    /// 回收过期条目，返回清除数量（清理 worker 用）
    fn purge_expired(&self, now: DateTime<Utc>, max_removals: u64) -> Result<u64, CacheError>;
    fn len(&self) -> Result<u64, CacheError>;

    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

/// sled 持久化实现：复用行存同一个 Db 下的 diag_cache 树。
pub struct SledCache {
    tree: sled::Tree,
}

impl SledCache {
    pub fn new(store: &Store) -> Self {
        Self {
            tree: store.diag_cache.clone(),
        }
    }
}

impl AnalyticsCache for SledCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.tree.get(key.as_bytes())? {
            Some(raw) => {
                let entry: CacheEntry = serde_json::from_slice(&raw)?;
                if entry.is_expired(Utc::now()) {
                    self.tree.remove(key.as_bytes())?;
                    return Ok(None);
                }
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        // 同键竞写直接覆盖：相同输入的计算结果是确定性的
        self.tree
            .insert(key.as_bytes(), serde_json::to_vec(entry)?)?;
        Ok(())
    }

    fn invalidate_all(&self) -> Result<(), CacheError> {
        self.tree.clear()?;
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>, max_removals: u64) -> Result<u64, CacheError> {
        let mut removed = 0u64;
        for item in self.tree.iter() {
            if removed >= max_removals {
                break;
            }
            let (key, value) = item?;
            let expired = match serde_json::from_slice::<CacheEntry>(&value) {
                Ok(entry) => entry.is_expired(now),
                // 无法解析的条目一并回收
                Err(_) => true,
            };
            if expired {
                self.tree.remove(key.as_ref())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn len(&self) -> Result<u64, CacheError> {
        Ok(self.tree.len() as u64)
    }
}

/// 内存实现：测试替身，带确定性过期
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalyticsCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        match map.get(key) {
            Some(entry) if entry.is_expired(Utc::now()) => {
                map.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        map.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn invalidate_all(&self) -> Result<(), CacheError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        map.clear();
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>, _max_removals: u64) -> Result<u64, CacheError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        Ok((before - map.len()) as u64)
    }

    fn len(&self) -> Result<u64, CacheError> {
        let map = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(map.len() as u64)
    }
}
