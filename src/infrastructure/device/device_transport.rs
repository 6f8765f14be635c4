// infrastructure/device/device_transport.rs

use crate::errors::SignError;
use async_trait::async_trait;
use std::fmt;

/// 一次设备会话的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Ledger 走蓝牙，Keystone 走二维码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ble,
    Qr,
}

/// 硬件设备的帧传输层（配对、BLE 分包、二维码动画都在实现里）
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// 连接失败返回 `DeviceDisconnected`
    async fn open_session(&self) -> Result<SessionId, SignError>;

    /// 发送一帧 APDU，返回设备应答（`data || SW1 SW2`）
    async fn exchange(&self, session: SessionId, frame: Vec<u8>) -> Result<Vec<u8>, SignError>;

    /// 释放会话。同步调用，可在 `Drop` 中使用；重复释放必须无副作用
    fn release(&self, session: SessionId);
}

/// 未配对任何设备时的占位传输
pub struct NoDeviceTransport {
    kind: TransportKind,
}

impl NoDeviceTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DeviceTransport for NoDeviceTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open_session(&self) -> Result<SessionId, SignError> {
        Err(SignError::DeviceDisconnected(format!(
            "no {:?} device paired",
            self.kind
        )))
    }

    async fn exchange(&self, session: SessionId, _frame: Vec<u8>) -> Result<Vec<u8>, SignError> {
        Err(SignError::DeviceDisconnected(format!("{} is not open", session)))
    }

    fn release(&self, _session: SessionId) {}
}
