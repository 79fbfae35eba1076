//! # Core Service エラー定義
//!
//! ユースケースが返すエラーと、コントローラがステータスを決めるための分類を定義する。
//!
//! | 分類 | 対象 |
//! |------|------|
//! | `BadRequest` | 入力値・モジュール・予約数の誤り |
//! | `NotFound` | コード・ロットが存在しない |
//! | `Conflict` | 状態遷移の拒否、書式ロック、楽観的更新の競合 |
//! | `Internal` | 連番枯渇、カウンター不整合、DB 障害 |

use ludo_domain::DomainError;
use ludo_infra::{InfraError, InfraErrorKind};
use thiserror::Error;

/// Core Service で発生するエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// ビジネスルール違反
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain(e) => match e {
                DomainError::Validation(_)
                | DomainError::InvalidModule(_)
                | DomainError::InvalidQuantity { .. }
                | DomainError::ModuleMismatch { .. } => ErrorCategory::BadRequest,
                DomainError::CodeNotFound { .. } | DomainError::LotNotFound { .. } => {
                    ErrorCategory::NotFound
                }
                DomainError::FormatLocked { .. }
                | DomainError::AlreadyUsed { .. }
                | DomainError::AlreadyBurned { .. }
                | DomainError::AlreadyCancelled { .. }
                | DomainError::CodeCancelled { .. }
                | DomainError::NotCancelled { .. }
                | DomainError::LotAlreadyCancelled { .. } => ErrorCategory::Conflict,
                DomainError::SequenceExhausted { .. } | DomainError::LotCounterMismatch { .. } => {
                    ErrorCategory::Internal
                }
            },
            Self::Database(e) => match e.kind() {
                InfraErrorKind::Conflict { .. } => ErrorCategory::Conflict,
                _ => ErrorCategory::Internal,
            },
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// 同じ操作をやり直せば成功しうるか
    ///
    /// ドメインエラーは入力か業務状態の問題なので対象外。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => e.is_retryable(),
            Self::Domain(_) | Self::Internal(_) => false,
        }
    }
}
