// services/fee/fee_strategy.rs

use serde::{Deserialize, Serialize};

/// 费用档位：交易没有给出价格时，对链上 baseFee 的上浮策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePreset {
    Low,
    Normal,
    High,
    Urgent,
}

impl FeePreset {
    /// baseFee 上浮百分比（100 = 无调整）
    /// 示例：150 表示 price_per_gas = base_fee × 150%
    pub fn base_fee_buffer_percent(&self) -> u64 {
        match self {
            FeePreset::Low => 100,    // 无调整
            FeePreset::Normal => 120, // +20%
            FeePreset::High => 150,   // +50%
            FeePreset::Urgent => 200, // ×2
        }
    }
}
