use crate::models::domain::{Fee, FeeUnit};
use bigdecimal::BigDecimal;
use ethers_core::types::U256;
use num_format::{Locale, ToFormattedString};
use std::str::FromStr;

/// 将U256 BigDecimal
pub fn u256_to_bigdecimal(value: U256) -> BigDecimal {
    // 先转字符串再转 BigDecimal（处理大数最稳）
    let s = value.to_string();
    BigDecimal::from_str(&s).unwrap_or_else(|_| BigDecimal::from(0))
}

/// 千分位整数：280000 -> "280,000"
pub fn group_digits(value: U256) -> String {
    if value <= U256::from(u128::MAX) {
        value.as_u128().to_formatted_string(&Locale::en)
    } else {
        value.to_string()
    }
}

/// 最小单位换算为主币单位，去掉末尾多余的 0
pub fn to_native_units(value: U256, unit: FeeUnit) -> String {
    let decimals = decimals_of(unit);
    let scaled = u256_to_bigdecimal(value) / BigDecimal::from(10u64.pow(decimals));
    scaled.normalized().to_string()
}

fn decimals_of(unit: FeeUnit) -> u32 {
    match unit {
        FeeUnit::Wei => 18,
        FeeUnit::NanoAvax | FeeUnit::Lamport => 9,
        FeeUnit::Satoshi => 8,
    }
}

/// 审批界面展示的费用："280,000 nAVAX (0.00028 AVAX)"
pub fn format_fee(fee: &Fee, symbol: &str) -> String {
    format!(
        "{} {} ({} {})",
        group_digits(fee.total),
        fee.unit.symbol(),
        to_native_units(fee.total, fee.unit),
        symbol
    )
}
