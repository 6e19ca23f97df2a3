pub const ORDER_LINES: &str = "order_lines";
pub const IMPORT_BATCHES: &str = "import_batches";
pub const DIAG_CACHE: &str = "diag_cache";
pub const META: &str = "meta";

// Secondary index trees
pub const LINES_BY_DATE: &str = "lines_by_date";
