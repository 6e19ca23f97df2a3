//! 数据导入边界：宽松 JSON 行 -> 强类型明细行。
//!
//! 上游导出的报表列名不稳定（同义列、驼峰/下划线混用），
//! 别名解析和数值强转都发生在这一层，行存之后全部是强类型。

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_UPLOAD_ROWS};
use crate::extractors::JsonBody;
use crate::response::{created, ok, paginated, AppError};
use crate::state::AppState;
use crate::store::operations::import_batches::ImportBatch;
use crate::store::operations::order_lines::OrderLine;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/batches", get(list_batches))
        .route("/batches/:id", delete(delete_batch))
        .route("/version", get(data_version))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    source_name: Option<String>,
    rows: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    batch: ImportBatch,
    data_version: u64,
}

async fn upload(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UploadRequest>,
) -> Result<axum::response::Response, AppError> {
    if req.rows.is_empty() {
        return Err(AppError::bad_request("EMPTY_UPLOAD", "上传数据为空"));
    }
    if req.rows.len() > MAX_UPLOAD_ROWS {
        return Err(AppError::payload_too_large(&format!(
            "单次上传最多 {MAX_UPLOAD_ROWS} 行"
        )));
    }

    let batch_id = uuid::Uuid::new_v4().to_string();
    let tz = state.config().business_timezone;
    let (lines, coerced_cells) = parse_rows(&req.rows, &batch_id, tz)?;

    let order_count = {
        let mut ids: Vec<&str> = lines.iter().map(|l| l.order_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len() as u64
    };

    let batch = ImportBatch {
        id: batch_id,
        source_name: req.source_name,
        row_count: lines.len() as u64,
        order_count,
        coerced_cells,
        created_at: Utc::now(),
    };

    state.store().insert_batch(&batch, &lines)?;
    // 缓存清空必须先于响应返回，后续读请求不允许看到旧结果
    state.engine().invalidate_cache();
    let data_version = state.store().data_version()?;

    Ok(created(UploadResponse {
        batch,
        data_version,
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBatchesQuery {
    page: Option<u64>,
    per_page: Option<u64>,
}

async fn list_batches(
    Query(q): Query<ListBatchesQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let per_page = q
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let all = state.store().list_import_batches()?;
    let total = all.len() as u64;
    let start = ((page - 1) * per_page) as usize;
    let items: Vec<ImportBatch> = all.into_iter().skip(start).take(per_page as usize).collect();

    Ok(paginated(items, total, page, per_page))
}

async fn delete_batch(
    Path(batch_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state.store().delete_batch(&batch_id)?;
    state.engine().invalidate_cache();
    let data_version = state.store().data_version()?;

    Ok(ok(serde_json::json!({
        "batchId": batch_id,
        "removedRows": removed,
        "dataVersion": data_version,
    })))
}

async fn data_version(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(serde_json::json!({
        "dataVersion": state.store().data_version()?,
        "lineCount": state.store().count_lines()?,
    })))
}

/// 别名表：同义列第一处命中生效。下划线与驼峰都接受。
const ALIAS_ORDER_ID: &[&str] = &["order_id", "orderId"];
const ALIAS_LINE_ID: &[&str] = &["line_id", "lineId"];
const ALIAS_TS: &[&str] = &["ts", "timestamp", "order_time", "orderTime"];
const ALIAS_STORE: &[&str] = &["store", "store_name", "storeName"];
const ALIAS_CHANNEL: &[&str] = &["channel"];
const ALIAS_DELIVERY_FEE: &[&str] = &[
    "delivery_fee",
    "deliveryFee",
    "shipping_fee",
    "shippingFee",
];
const ALIAS_PLATFORM_FEE: &[&str] = &["platform_fee", "platformFee", "commission"];
const ALIAS_DISTANCE: &[&str] = &["delivery_distance", "deliveryDistance"];
const ALIAS_FRANCHISE: &[&str] = &["franchise_type", "franchiseType"];

fn lookup<'a>(row: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let obj = row.as_object()?;
    aliases.iter().find_map(|key| obj.get(*key))
}

fn required_str(row: &Value, aliases: &[&str], index: usize) -> Result<String, AppError> {
    match lookup(row, aliases).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(AppError::bad_request(
            "DATA_SHAPE_ERROR",
            &format!("第 {} 行缺少必填字段: {}", index + 1, aliases[0]),
        )),
    }
}

fn optional_str(row: &Value, aliases: &[&str]) -> String {
    lookup(row, aliases)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// 数值单元格：数字直接用；字符串尝试解析；其余（含 null）置零。
/// 一切非数字 JSON 类型的单元格都计入 coerced。
fn numeric(row: &Value, aliases: &[&str], coerced: &mut u64) -> f64 {
    match lookup(row, aliases) {
        None => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            *coerced += 1;
            s.trim().parse::<f64>().unwrap_or(0.0)
        }
        Some(_) => {
            *coerced += 1;
            0.0
        }
    }
}

/// 距离列允许缺失：缺失/空值是 None，不伪装成 0
fn optional_numeric(row: &Value, aliases: &[&str], coerced: &mut u64) -> Option<f64> {
    match lookup(row, aliases) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            *coerced += 1;
            s.trim().parse::<f64>().ok()
        }
        Some(_) => {
            *coerced += 1;
            None
        }
    }
}

/// 时间戳：RFC3339 带时区直接转 UTC；裸时间按业务时区解释
fn parse_ts(raw: &str, tz: Tz, index: usize) -> Result<DateTime<Utc>, AppError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            if let Some(local) = tz.from_local_datetime(&naive).earliest() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }
    Err(AppError::bad_request(
        "DATA_SHAPE_ERROR",
        &format!("第 {} 行时间戳无法解析: {raw}", index + 1),
    ))
}

fn parse_rows(
    rows: &[Value],
    batch_id: &str,
    tz: Tz,
) -> Result<(Vec<OrderLine>, u64), AppError> {
    let mut lines = Vec::with_capacity(rows.len());
    let mut coerced = 0u64;

    for (index, row) in rows.iter().enumerate() {
        let order_id = required_str(row, ALIAS_ORDER_ID, index)?;
        let ts_raw = required_str(row, ALIAS_TS, index)?;
        let ts = parse_ts(&ts_raw, tz, index)?;
        let store = required_str(row, ALIAS_STORE, index)?;
        let channel = required_str(row, ALIAS_CHANNEL, index)?;

        let line_id = lookup(row, ALIAS_LINE_ID)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let unit_price = numeric(row, &["unit_price", "unitPrice"], &mut coerced);
        let unit_cost = numeric(row, &["unit_cost", "unitCost"], &mut coerced);
        let quantity = match lookup(row, &["quantity", "qty"]) {
            None => 1.0,
            _ => numeric(row, &["quantity", "qty"], &mut coerced),
        };

        // 行营收缺失时按单价 × 数量推导，推导发生在任何分组之前
        let item_revenue = match lookup(row, &["item_revenue", "itemRevenue"]) {
            None | Some(Value::Null) => unit_price * quantity,
            _ => numeric(row, &["item_revenue", "itemRevenue"], &mut coerced),
        };
        let item_profit = match lookup(row, &["item_profit", "itemProfit"]) {
            None | Some(Value::Null) => item_revenue - unit_cost * quantity,
            _ => numeric(row, &["item_profit", "itemProfit"], &mut coerced),
        };

        lines.push(OrderLine {
            line_id,
            batch_id: batch_id.to_string(),
            order_id,
            ts,
            store,
            channel,
            product_id: optional_str(row, &["product_id", "productId"]),
            product_name: optional_str(row, &["product_name", "productName"]),
            category_l1: optional_str(row, &["category_l1", "categoryL1"]),
            category_l3: optional_str(row, &["category_l3", "categoryL3"]),
            unit_price,
            unit_cost,
            quantity,
            delivery_fee: numeric(row, ALIAS_DELIVERY_FEE, &mut coerced),
            platform_fee: numeric(row, ALIAS_PLATFORM_FEE, &mut coerced),
            delivery_distance: optional_numeric(row, ALIAS_DISTANCE, &mut coerced),
            franchise_type: optional_str(row, ALIAS_FRANCHISE),
            item_revenue,
            item_profit,
            item_fee_alloc: numeric(row, &["item_fee_alloc", "itemFeeAlloc"], &mut coerced),
            delivery_fee_waiver: numeric(
                row,
                &["delivery_fee_waiver", "deliveryFeeWaiver"],
                &mut coerced,
            ),
            threshold_discount: numeric(
                row,
                &["threshold_discount", "thresholdDiscount"],
                &mut coerced,
            ),
            item_discount: numeric(row, &["item_discount", "itemDiscount"], &mut coerced),
            merchant_voucher: numeric(row, &["merchant_voucher", "merchantVoucher"], &mut coerced),
            shared_voucher: numeric(row, &["shared_voucher", "sharedVoucher"], &mut coerced),
            gift_amount: numeric(row, &["gift_amount", "giftAmount"], &mut coerced),
            other_discount: numeric(row, &["other_discount", "otherDiscount"], &mut coerced),
            new_customer_discount: numeric(
                row,
                &["new_customer_discount", "newCustomerDiscount"],
                &mut coerced,
            ),
        });
    }

    Ok((lines, coerced))
}
