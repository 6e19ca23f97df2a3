pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub order_lines: sled::Tree,
    pub import_batches: sled::Tree,
    pub diag_cache: sled::Tree,
    pub meta: sled::Tree,
    // Secondary index trees
    pub lines_by_date: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let order_lines = db.open_tree(trees::ORDER_LINES)?;
        let import_batches = db.open_tree(trees::IMPORT_BATCHES)?;
        let diag_cache = db.open_tree(trees::DIAG_CACHE)?;
        let meta = db.open_tree(trees::META)?;
        let lines_by_date = db.open_tree(trees::LINES_BY_DATE)?;

        Ok(Self {
            db,
            order_lines,
            import_batches,
            diag_cache,
            meta,
            lines_by_date,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    /// 数据版本号：行存每次写入/删除都单调递增。
    /// 缓存键包含该版本号，保证数据变更后旧缓存键不再被命中。
    pub fn data_version(&self) -> Result<u64, StoreError> {
        match self.meta.get(keys::DATA_VERSION_KEY.as_bytes())? {
            Some(raw) if raw.len() == 8 => {
                let bytes: [u8; 8] = raw.as_ref().try_into().unwrap_or([0; 8]);
                Ok(u64::from_be_bytes(bytes))
            }
            _ => Ok(0),
        }
    }

    /// 递增数据版本号并返回新值。写操作必须在响应请求之前调用。
    pub fn bump_data_version(&self) -> Result<u64, StoreError> {
        let updated = self
            .meta
            .update_and_fetch(keys::DATA_VERSION_KEY.as_bytes(), |old| {
                let current = old
                    .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                Some(current.wrapping_add(1).to_be_bytes().to_vec())
            })?;
        let bytes: [u8; 8] = updated
            .as_deref()
            .and_then(|raw| raw.try_into().ok())
            .unwrap_or([0; 8]);
        Ok(u64::from_be_bytes(bytes))
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
