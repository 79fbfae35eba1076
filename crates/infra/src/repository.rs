//! # リポジトリ実装
//!
//! 書式設定・ロット・コードレコードの永続化を提供する。
//!
//! ## 設計方針
//!
//! - **トレイト経由**: ユースケース層は `Arc<dyn Trait>` で受け取り、テストではモックに差し替える
//! - **書き込みは TxContext 必須**: 複数レコードの更新を 1 トランザクションにまとめる
//! - **ロック順序**: 書式設定 → ロット → コードレコードの順にロックを取る

pub mod code_record_repository;
pub mod format_config_repository;
pub mod lot_repository;

pub use code_record_repository::{
    CodeRecordRepository,
    CodeRepositoryRegistry,
    PostgresCodeRecordRepository,
    code_table,
};
pub use format_config_repository::{FormatConfigRepository, PostgresFormatConfigRepository};
pub use lot_repository::{LotQuery, LotRepository, PostgresLotRepository};
