/// 单次上传最多接受的订单明细行数
pub const MAX_UPLOAD_ROWS: usize = 50_000;

/// 列表接口默认分页大小
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// 列表接口最大分页大小
pub const MAX_PAGE_SIZE: u64 = 100;

/// 配送距离分段下边界（公里），最后一段开放到正无穷
pub const DISTANCE_BAND_EDGES: [f64; 7] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

/// 配送距离分段数量（渲染层依赖固定长度）
pub const DISTANCE_BAND_COUNT: usize = 7;

/// 小时分桶数量（渲染层依赖固定长度）
pub const HOURS_PER_DAY: usize = 24;

/// 营销费用子字段数量
pub const MARKETING_FIELD_COUNT: usize = 8;

/// 高峰判定系数：order_count > mean + PEAK_STDDEV_FACTOR * stddev
pub const PEAK_STDDEV_FACTOR: f64 = 0.5;
