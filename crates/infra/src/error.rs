//! # インフラ層エラー
//!
//! [`InfraError`] は種別 [`InfraErrorKind`] と、生成時点の [`SpanTrace`] を持つ。
//! `?` で sqlx のエラーを変換した場合も、どのリポジトリメソッドの中で
//! 失敗したかがスパンとして残る。
//!
//! ## リトライ判定
//!
//! ロット予約は [`InfraError::is_retryable`] が `true` の場合だけ
//! 最初の読み取りからやり直す。
//!
//! | 原因 | 判定 |
//! |------|------|
//! | SQLSTATE `40001`（serialization_failure） | リトライ |
//! | SQLSTATE `40P01`（deadlock_detected） | リトライ |
//! | SQLSTATE `23505`（unique_violation、並行予約とのコード衝突） | リトライ |
//! | [`InfraErrorKind::Conflict`]（状態の前提条件を満たさない更新） | リトライ |
//! | それ以外 | そのまま返す |

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// インフラ層で発生するエラー
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// SQL の実行失敗・接続エラー・制約違反
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// 期待した状態の行が見つからない更新
    ///
    /// `WHERE status = $expected` 付き UPDATE が 0 行だった場合や、
    /// 事前読み取りとロック後の読み取りでロットが食い違った場合。
    #[error("競合が発生しました: {entity}(id={id})")]
    Conflict {
        /// エンティティ名（例: "CodeRecord"）
        entity: String,
        /// ID またはコード文字列
        id:     String,
    },

    /// DB の値がドメインの型に戻せない
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

impl InfraError {
    fn with_kind(kind: InfraErrorKind) -> Self {
        Self {
            kind,
            span_trace: SpanTrace::capture(),
        }
    }

    /// 競合エラー
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::with_kind(InfraErrorKind::Conflict {
            entity: entity.into(),
            id:     id.into(),
        })
    }

    /// 復元できない行などの予期しないエラー
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::with_kind(InfraErrorKind::Unexpected(msg.into()))
    }

    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// 競合エラーであれば `(entity, id)` を返す
    pub fn as_conflict(&self) -> Option<(&str, &str)> {
        match &self.kind {
            InfraErrorKind::Conflict { entity, id } => Some((entity, id)),
            _ => None,
        }
    }

    /// DB エラーの SQLSTATE
    pub fn sqlstate(&self) -> Option<String> {
        let InfraErrorKind::Database(e) = &self.kind else {
            return None;
        };
        e.as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned())
    }

    /// やり直せば成功し得るエラーかどうか
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            InfraErrorKind::Conflict { .. } => true,
            InfraErrorKind::Database(_) => matches!(
                self.sqlstate().as_deref(),
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION)
            ),
            InfraErrorKind::Unexpected(_) => false,
        }
    }
}

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self::with_kind(InfraErrorKind::Database(source))
    }
}
