use std::sync::OnceLock;

use regex::Regex;

use crate::db_types::{OrderCode, ORDER_CODE_LENGTH};

fn digit_runs() -> &'static Regex {
    static DIGIT_RUNS: OnceLock<Regex> = OnceLock::new();
    DIGIT_RUNS.get_or_init(|| Regex::new(r"[0-9]+").expect("digit run pattern is valid"))
}

/// Finds the order code in free transfer text, as written by a bank-feed notification.
///
/// Banks mangle the content the donor typed in all sorts of ways (prefixes, suffixes, upper-casing, extra reference
/// numbers), so the only thing relied on is that the order code survives as a standalone run of exactly 16 digits.
/// Digit runs of any other length, including longer runs that happen to contain 16 digits, are ignored. Only ASCII
/// digits count. The first qualifying run wins.
pub fn extract_order_code(content: &str) -> Option<OrderCode> {
    digit_runs()
        .find_iter(content)
        .map(|m| m.as_str())
        .find(|run| run.len() == ORDER_CODE_LENGTH)
        .and_then(|run| run.parse().ok())
}

/// The transfer content a donor should use when paying through the bank feed.
pub fn suggested_transfer_content(order_code: &OrderCode) -> String {
    format!("CAMPFUND {order_code}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn find_order_codes() {
        let code = extract_order_code("ZP25313009538668 1762653025868727 GD 244932-110925 15:10:30").unwrap();
        assert_eq!(code.as_str(), "1762653025868727");
        let code = extract_order_code("1762653025868727").unwrap();
        assert_eq!(code.as_str(), "1762653025868727");
        let code = extract_order_code("CAMPFUND1762653025868727.").unwrap();
        assert_eq!(code.as_str(), "1762653025868727");
    }

    #[test]
    fn ignore_non_standalone_runs() {
        assert_eq!(extract_order_code(""), None);
        assert_eq!(extract_order_code("Ung ho quy tu thien"), None);
        assert_eq!(extract_order_code("MBVCB.123456789.176265302586872.CT tu"), None);
        // 17 digits is a different reference number, not an order code with a stray digit
        assert_eq!(extract_order_code("17626530258687271"), None);
        let code = extract_order_code("17626530258687271 then 1762653025868999").unwrap();
        assert_eq!(code.as_str(), "1762653025868999");
    }

    #[test]
    fn only_ascii_digits_form_a_code() {
        // Eight Arabic-Indic digits are sixteen bytes long
        let code = extract_order_code("٠١٢٣٤٥٦٧ CAMPFUND 1762653025868727").unwrap();
        assert_eq!(code.as_str(), "1762653025868727");
        assert_eq!(extract_order_code("１７６２６５３０２５８６８７２７"), None);
    }

    #[test]
    fn suggested_content_round_trips() {
        let code: OrderCode = "1762653025868727".parse().unwrap();
        let content = suggested_transfer_content(&code);
        assert_eq!(extract_order_code(&content), Some(code));
    }
}
