//! Utility functions and helpers

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// Separator between account path components
pub const ACCOUNT_SEPARATOR: char = ':';

/// Split a colon-delimited account path into its components
pub fn split_account_path(path: &str) -> Vec<&str> {
    path.split(ACCOUNT_SEPARATOR).collect()
}

/// Join account names into a colon-delimited path
pub fn join_account_path<S: AsRef<str>>(components: &[S]) -> String {
    components
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(&ACCOUNT_SEPARATOR.to_string())
}

/// Format an amount with two decimals, right-aligned to `width`
pub fn format_amount(amount: Decimal, width: usize) -> String {
    let text = format!("{:.2}", amount.round_dp(2));
    format!("{:>width$}", text, width = width)
}

/// One report line: date, description padded to 20 columns, amount
pub fn format_report_line(date: NaiveDateTime, description: &str, amount: Decimal) -> String {
    format!(
        "{} {:20}  {}",
        date.format("%Y-%m-%d"),
        description,
        format_amount(amount, 10)
    )
}
