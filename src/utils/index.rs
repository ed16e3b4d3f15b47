use crate::transaction::RAW_DECIMALS;

/// Render a raw amount as whole units with every significant decimal.
///
/// Raw amounts span the full `u128` range, so this is exact integer formatting rather
/// than a float conversion.
pub fn format_raw_amount(raw: u128) -> String {
    let unit = 10u128.pow(RAW_DECIMALS);
    let whole = raw / unit;
    let fraction = raw % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = RAW_DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
