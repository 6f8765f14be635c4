//! 密钥存储：按槽位名存取不透明的秘密字节。
//!
//! 落盘加密由平台负责；这里只负责搬运字节，并保证秘密在内存中使用可清零的缓冲区。

use crate::errors::SignError;
use crate::log_debug;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use zeroize::Zeroizing;

pub type SecretBytes = Zeroizing<Vec<u8>>;

#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn store(&self, slot: &str, secret: SecretBytes) -> Result<(), SignError>;

    /// 槽位为空时返回 `Ok(None)`
    async fn load(&self, slot: &str) -> Result<Option<SecretBytes>, SignError>;
}

/// 内存实现（测试、或运行时注入密钥的宿主使用）
#[derive(Default)]
pub struct MemorySecureStorage {
    slots: RwLock<HashMap<String, SecretBytes>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn store(&self, slot: &str, secret: SecretBytes) -> Result<(), SignError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| SignError::Storage("secure storage lock poisoned".into()))?;
        slots.insert(slot.to_string(), secret);
        Ok(())
    }

    async fn load(&self, slot: &str) -> Result<Option<SecretBytes>, SignError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| SignError::Storage("secure storage lock poisoned".into()))?;
        Ok(slots.get(slot).cloned())
    }
}

/// 每个槽位对应 `key_dir` 下的一个 hex 文件
pub struct FileSecureStorage {
    key_dir: PathBuf,
}

impl FileSecureStorage {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
        }
    }

    fn path_for(&self, slot: &str) -> Result<PathBuf, SignError> {
        if slot.is_empty() || slot.contains("..") {
            return Err(SignError::Storage(format!("invalid slot name: {:?}", slot)));
        }
        Ok(self.key_dir.join(format!("{}.key", slot.replace('/', "_"))))
    }
}

#[async_trait]
impl SecureStorage for FileSecureStorage {
    async fn store(&self, slot: &str, secret: SecretBytes) -> Result<(), SignError> {
        let path = self.path_for(slot)?;
        tokio::fs::create_dir_all(&self.key_dir).await?;
        let encoded = Zeroizing::new(hex::encode(secret.as_slice()));
        tokio::fs::write(&path, encoded.as_bytes()).await?;
        log_debug!("stored key slot {} at {}", slot, path.display());
        Ok(())
    }

    async fn load(&self, slot: &str) -> Result<Option<SecretBytes>, SignError> {
        let path = self.path_for(slot)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Zeroizing::new(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let decoded = hex::decode(raw.trim())
            .map_err(|e| SignError::Storage(format!("slot {} is corrupt: {}", slot, e)))?;
        Ok(Some(Zeroizing::new(decoded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_round_trip_and_missing_slot() {
        let storage = MemorySecureStorage::new();
        assert!(storage.load("w/0/secp256k1").await.unwrap().is_none());
        storage
            .store("w/0/secp256k1", Zeroizing::new(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(
            storage.load("w/0/secp256k1").await.unwrap().unwrap().as_slice(),
            &[1, 2, 3]
        );
    }

    #[tokio::test]
    async fn file_storage_persists_hex() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSecureStorage::new(dir.path());
        storage
            .store("wallet/1/ed25519", Zeroizing::new(vec![0xab; 32]))
            .await
            .unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join("wallet_1_ed25519.key")).unwrap();
        assert_eq!(on_disk, "ab".repeat(32));
        assert_eq!(
            storage.load("wallet/1/ed25519").await.unwrap().unwrap().len(),
            32
        );
        assert!(storage.load("wallet/2/ed25519").await.unwrap().is_none());
        assert!(storage.load("../etc/passwd").await.is_err());
    }
}
