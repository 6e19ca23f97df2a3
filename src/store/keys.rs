use crate::store::StoreError;

fn validate_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::Validation(format!("{kind} 不能为空")));
    }
    if id.contains(':') {
        return Err(StoreError::Validation(format!("{kind} 不能包含冒号: {id}")));
    }
    Ok(())
}

pub fn order_line_key(order_id: &str, line_id: &str) -> Result<String, StoreError> {
    validate_id("order_id", order_id)?;
    validate_id("line_id", line_id)?;
    Ok(format!("{order_id}:{line_id}"))
}

/// 日期索引键：`{UTC日期}:{order_id}:{line_id}`，值为主键字节。
/// 索引日期按 UTC 记录；按业务时区查询时向两侧各扩一天再精确过滤，
/// 这样时区配置变更不会使索引失效。
pub fn line_date_index_key(
    utc_date: &str,
    order_id: &str,
    line_id: &str,
) -> Result<String, StoreError> {
    validate_id("order_id", order_id)?;
    validate_id("line_id", line_id)?;
    Ok(format!("{utc_date}:{order_id}:{line_id}"))
}

pub fn line_date_index_start(utc_date: &str) -> String {
    format!("{utc_date}:")
}

pub fn import_batch_key(batch_id: &str) -> Result<String, StoreError> {
    validate_id("batch_id", batch_id)?;
    Ok(batch_id.to_string())
}

pub const DATA_VERSION_KEY: &str = "_meta:data_version";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_keys_compose() {
        let key = order_line_key("ORD1001", "a1b2").unwrap();
        assert_eq!(key, "ORD1001:a1b2");
    }

    #[test]
    fn colon_in_order_id_is_rejected() {
        let err = order_line_key("bad:id", "a1").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn date_index_orders_chronologically() {
        let k1 = line_date_index_key("2024-03-01", "o1", "l1").unwrap();
        let k2 = line_date_index_key("2024-03-02", "o1", "l1").unwrap();
        assert!(k1 < k2);
    }
}
