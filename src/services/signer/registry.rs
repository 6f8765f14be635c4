use crate::models::domain::WalletType;
use crate::services::signer::signer_trait::SigningBackend;
use std::sync::Arc;

/// 钱包类型 -> 签名后端。全匹配，新增钱包类型时编译器会强制补上映射
#[derive(Clone)]
pub struct SignerRegistry {
    local_key: Arc<dyn SigningBackend>,
    ledger: Arc<dyn SigningBackend>,
    keystone: Arc<dyn SigningBackend>,
    remote_mpc: Arc<dyn SigningBackend>,
}

impl SignerRegistry {
    pub fn new(
        local_key: Arc<dyn SigningBackend>,
        ledger: Arc<dyn SigningBackend>,
        keystone: Arc<dyn SigningBackend>,
        remote_mpc: Arc<dyn SigningBackend>,
    ) -> Self {
        Self {
            local_key,
            ledger,
            keystone,
            remote_mpc,
        }
    }

    pub fn select_backend(&self, wallet_type: WalletType) -> Arc<dyn SigningBackend> {
        match wallet_type {
            WalletType::Mnemonic | WalletType::PrivateKey => self.local_key.clone(),
            WalletType::Seedless => self.remote_mpc.clone(),
            WalletType::Ledger => self.ledger.clone(),
            WalletType::Keystone => self.keystone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HardwareConfig;
    use crate::infrastructure::device::{NoDeviceTransport, TransportKind};
    use crate::infrastructure::mpc::{JsonRpcMpcClient, StaticTokenRefresher};
    use crate::infrastructure::storage::MemorySecureStorage;
    use crate::services::signer::{
        BackendKind, HardwareDeviceSigner, LocalKeySigner, RemoteMpcSigner,
    };

    fn registry() -> SignerRegistry {
        let hardware = |kind| {
            Arc::new(HardwareDeviceSigner::new(
                Arc::new(NoDeviceTransport::new(kind)),
                &HardwareConfig::default(),
            ))
        };
        SignerRegistry::new(
            Arc::new(LocalKeySigner::new(Arc::new(MemorySecureStorage::new()))),
            hardware(TransportKind::Ble),
            hardware(TransportKind::Qr),
            Arc::new(RemoteMpcSigner::new(
                Arc::new(JsonRpcMpcClient::new("http://localhost:8545").unwrap()),
                Arc::new(StaticTokenRefresher::new("token")),
            )),
        )
    }

    #[test]
    fn every_wallet_type_has_a_backend() {
        let registry = registry();
        let cases = [
            (WalletType::Mnemonic, BackendKind::LocalKey),
            (WalletType::PrivateKey, BackendKind::LocalKey),
            (WalletType::Seedless, BackendKind::RemoteMpc),
            (WalletType::Ledger, BackendKind::HardwareDevice(TransportKind::Ble)),
            (WalletType::Keystone, BackendKind::HardwareDevice(TransportKind::Qr)),
        ];
        for (wallet_type, kind) in cases {
            assert_eq!(registry.select_backend(wallet_type).kind(), kind);
        }
    }
}
