#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod inventory;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, KeelError, TransportError, VerificationError};

// 설정
pub use config::KeelConfig;

// 인벤토리
pub use inventory::Inventory;

// 도메인 타입
pub use types::{ClusterHandle, Distro, Node, NodeCount, NodeRole, SafetyChecks, UpgradeMode};
