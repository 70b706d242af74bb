mod order_code;

pub use order_code::{extract_order_code, suggested_transfer_content};
