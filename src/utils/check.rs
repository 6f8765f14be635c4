use ethers_core::types::Address;

/// 0x 开头的 20 字节地址
pub fn is_evm_address(raw: &str) -> bool {
    raw.starts_with("0x") && raw.len() == 42 && raw.parse::<Address>().is_ok()
}

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BASE58_CHARSET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// 比特币地址的格式检查（前缀 + 字符集 + 长度），不做校验和
pub fn is_btc_address(raw: &str, mainnet: bool) -> bool {
    let lower = raw.to_ascii_lowercase();
    let bech32_hrp = if mainnet { "bc1" } else { "tb1" };
    if let Some(rest) = lower.strip_prefix(bech32_hrp) {
        return (11..=87).contains(&raw.len()) && rest.chars().all(|c| BECH32_CHARSET.contains(c));
    }
    let legacy_prefixes: &[char] = if mainnet { &['1', '3'] } else { &['m', 'n', '2'] };
    raw.starts_with(legacy_prefixes)
        && (26..=35).contains(&raw.len())
        && raw.chars().all(|c| BASE58_CHARSET.contains(c))
}

/// `avax1...` / `fuji1...`，允许带 `X-` / `P-` 前缀
pub fn is_xp_address(raw: &str) -> bool {
    let body = raw
        .strip_prefix("X-")
        .or_else(|| raw.strip_prefix("P-"))
        .unwrap_or(raw);
    ["avax1", "fuji1", "local1"]
        .iter()
        .any(|hrp| body.strip_prefix(hrp).is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| BECH32_CHARSET.contains(c))))
}
