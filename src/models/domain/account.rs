// models/domain/account.rs

use crate::models::domain::chain::VmType;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletType {
    Mnemonic,
    PrivateKey,
    /// MPC 托管（远程门限签名）
    Seedless,
    Ledger,
    Keystone,
}

/// 钱包只持有凭据句柄，真实秘密在 SecureStorage / MPC 服务 / 硬件设备里
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: String,
    pub wallet_type: WalletType,
    pub credentials: String,
}

/// 账户只标识用哪个后端、哪个槽位签名，从不持有私钥
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub index: u32,
    pub wallet_id: String,
    pub address_evm: String,
    pub address_btc: String,
    #[serde(rename = "addressAVM")]
    pub address_xp: String,
    #[serde(default)]
    pub address_svm: Option<String>,
}

impl Account {
    pub fn address_for(&self, vm: VmType) -> Option<&str> {
        let address = match vm {
            VmType::Evm => self.address_evm.as_str(),
            VmType::Avm | VmType::Pvm => self.address_xp.as_str(),
            VmType::Bitcoin => self.address_btc.as_str(),
            VmType::Svm => self.address_svm.as_deref()?,
        };
        (!address.is_empty()).then_some(address)
    }

    /// EVM 地址大小写不敏感，其它链严格比较
    pub fn owns_address(&self, vm: VmType, address: &str) -> bool {
        match (vm, self.address_for(vm)) {
            (VmType::Evm, Some(own)) => own.eq_ignore_ascii_case(address),
            (VmType::Avm | VmType::Pvm, Some(own)) => {
                strip_chain_prefix(own) == strip_chain_prefix(address)
            }
            (_, Some(own)) => own == address,
            (_, None) => false,
        }
    }

    /// LocalKey 使用的 SecureStorage 槽位名
    pub fn key_slot(&self, vm: VmType) -> String {
        let curve = match vm {
            VmType::Svm => "ed25519",
            _ => "secp256k1",
        };
        format!("{}/{}/{}", self.wallet_id, self.index, curve)
    }
}

/// `X-avax1...` 与 `P-avax1...` 共用同一把 key
fn strip_chain_prefix(address: &str) -> &str {
    address
        .strip_prefix("X-")
        .or_else(|| address.strip_prefix("P-"))
        .unwrap_or(address)
}

/// 联系人（avalanche_createContact）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, rename = "addressXP", skip_serializing_if = "Option::is_none")]
    pub address_xp: Option<String>,
    #[serde(default, rename = "addressBTC", skip_serializing_if = "Option::is_none")]
    pub address_btc: Option<String>,
}

/// 当前活跃钱包及其账户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletContext {
    pub wallet: Wallet,
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub active_index: u32,
}

impl WalletContext {
    pub fn active_account(&self) -> Option<&Account> {
        self.account_by_index(self.active_index)
    }

    pub fn account_by_index(&self, index: u32) -> Option<&Account> {
        self.accounts.iter().find(|a| a.index == index)
    }

    pub fn account_by_address(&self, vm: VmType, address: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.owns_address(vm, address))
    }
}

/// 进程级的"活跃钱包"。读者拿到的是快照，切换钱包不会影响已拿到快照的请求。
#[derive(Default)]
pub struct ActiveWallet {
    current: ArcSwapOption<WalletContext>,
}

impl ActiveWallet {
    pub fn new(context: WalletContext) -> Self {
        Self {
            current: ArcSwapOption::from(Some(Arc::new(context))),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn switch(&self, context: WalletContext) {
        self.current.store(Some(Arc::new(context)));
    }

    pub fn snapshot(&self) -> Option<Arc<WalletContext>> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            index: 0,
            wallet_id: "w1".into(),
            address_evm: "0xAbC0000000000000000000000000000000000001".into(),
            address_btc: "bc1qexample".into(),
            address_xp: "avax1example".into(),
            address_svm: None,
        }
    }

    #[test]
    fn address_matching_per_vm() {
        let a = account();
        assert!(a.owns_address(VmType::Evm, "0xabc0000000000000000000000000000000000001"));
        assert!(a.owns_address(VmType::Avm, "X-avax1example"));
        assert!(a.owns_address(VmType::Pvm, "P-avax1example"));
        assert!(!a.owns_address(VmType::Bitcoin, "BC1QEXAMPLE"));
        assert!(!a.owns_address(VmType::Svm, "anything"));
        assert_eq!(a.key_slot(VmType::Avm), "w1/0/secp256k1");
        assert_eq!(a.key_slot(VmType::Svm), "w1/0/ed25519");
    }

    #[test]
    fn snapshot_survives_switch() {
        let ctx = WalletContext {
            wallet: Wallet {
                id: "w1".into(),
                wallet_type: WalletType::Mnemonic,
                credentials: "slot:w1".into(),
            },
            accounts: vec![account()],
            active_index: 0,
        };
        let active = ActiveWallet::new(ctx.clone());
        let before = active.snapshot().unwrap();

        let mut other = ctx;
        other.wallet.wallet_type = WalletType::Ledger;
        active.switch(other);

        assert_eq!(before.wallet.wallet_type, WalletType::Mnemonic);
        assert_eq!(active.snapshot().unwrap().wallet.wallet_type, WalletType::Ledger);
    }
}
