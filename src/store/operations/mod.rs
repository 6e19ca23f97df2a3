pub mod import_batches;
pub mod order_lines;
