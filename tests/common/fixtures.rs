use serde_json::{json, Value};

/// 一条标准上传行。时间用带时区的 RFC3339，测试里不依赖系统时区。
pub fn row(order_id: &str, line_id: &str, ts: &str) -> Value {
    json!({
        "order_id": order_id,
        "line_id": line_id,
        "ts": ts,
        "store": "门店A",
        "channel": "美团",
        "product_id": "p1",
        "product_name": "拿铁",
        "category_l1": "咖啡",
        "category_l3": "拿铁类",
        "unit_price": 15.0,
        "unit_cost": 5.0,
        "quantity": 1,
        "delivery_fee": 4.0,
        "platform_fee": 2.0,
        "delivery_distance": 1.5,
        "franchise_type": "直营",
        "item_revenue": 15.0,
        "item_profit": 10.0,
        "item_fee_alloc": 1.0,
        "threshold_discount": 1.0,
    })
}

pub fn with(mut base: Value, key: &str, value: Value) -> Value {
    base.as_object_mut()
        .expect("row is an object")
        .insert(key.to_string(), value);
    base
}

pub fn upload_body(rows: Vec<Value>) -> Value {
    json!({ "sourceName": "测试报表.xlsx", "rows": rows })
}

/// 一单三行：订单级字段重复，商品级字段各行分摊
pub fn three_line_order(order_id: &str, ts: &str) -> Vec<Value> {
    vec![
        with(
            with(row(order_id, "l1", ts), "item_revenue", json!(30.0)),
            "item_profit",
            json!(6.0),
        ),
        with(
            with(row(order_id, "l2", ts), "item_revenue", json!(20.0)),
            "item_profit",
            json!(4.0),
        ),
        with(
            with(row(order_id, "l3", ts), "item_revenue", json!(50.0)),
            "item_profit",
            json!(10.0),
        ),
    ]
}

/// 距离分桶用的 10 单：期望落桶 [2,1,1,1,1,1,3]
pub fn distance_spread_rows(ts: &str) -> Vec<Value> {
    let distances = [0.5, 0.9, 1.2, 2.5, 3.9, 4.1, 5.9, 6.0, 8.0, 10.0];
    distances
        .iter()
        .enumerate()
        .map(|(i, d)| {
            with(
                row(&format!("od{i}"), "l1", ts),
                "delivery_distance",
                json!(d),
            )
        })
        .collect()
}
