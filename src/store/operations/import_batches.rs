use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// 一次数据上传的元信息。上传/删除以批次为单位，对应原始系统的
/// 「导入一份报表 / 删除一份报表」操作。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub id: String,
    pub source_name: Option<String>,
    pub row_count: u64,
    pub order_count: u64,
    /// 数值单元格被强制置零的数量（非数字/空值），仅告警不拒绝
    pub coerced_cells: u64,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn get_import_batch(&self, batch_id: &str) -> Result<Option<ImportBatch>, StoreError> {
        let key = keys::import_batch_key(batch_id)?;
        match self.import_batches.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_import_batches(&self) -> Result<Vec<ImportBatch>, StoreError> {
        let mut batches = Vec::new();
        for item in self.import_batches.iter() {
            let (_, value) = item?;
            batches.push(Self::deserialize::<ImportBatch>(&value)?);
        }
        // 最近上传的排前面
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    pub(crate) fn put_import_batch(&self, batch: &ImportBatch) -> Result<(), StoreError> {
        let key = keys::import_batch_key(&batch.id)?;
        self.import_batches
            .insert(key.as_bytes(), Self::serialize(batch)?)?;
        Ok(())
    }

    pub(crate) fn remove_import_batch(&self, batch_id: &str) -> Result<(), StoreError> {
        let key = keys::import_batch_key(batch_id)?;
        self.import_batches.remove(key.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn batches_list_newest_first() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        for (id, secs) in [("b1", 100), ("b2", 200)] {
            store
                .put_import_batch(&ImportBatch {
                    id: id.to_string(),
                    source_name: None,
                    row_count: 1,
                    order_count: 1,
                    coerced_cells: 0,
                    created_at: DateTime::from_timestamp(secs, 0).unwrap(),
                })
                .unwrap();
        }

        let batches = store.list_import_batches().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].id, "b2");
    }
}
