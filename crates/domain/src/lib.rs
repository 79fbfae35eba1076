//! # Ludo ドメイン層
//!
//! バーコード採番のビジネスロジックを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 一意の識別子を持ち、状態遷移で新しい値を返す（例: Lot, CodeRecord）
//! - **値オブジェクト**: 検証済みの不変値（例: EntityId, LotQuantity）
//! - **純粋ロジック**: 書式のレンダリングや空き連番の探索は I/O を持たない
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! core-service → infra → domain
//! ```
//!
//! ドメイン層はインフラ層（DB）には一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`barcode`] - 書式設定・ロット・コードレコード・スキャン判定
//! - [`clock`] - 時刻プロバイダ
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`value_objects`] - 共通の値オブジェクト
//!
//! ## 使用例
//!
//! ```rust
//! use ludo_domain::{DomainError, barcode::BarcodeModule};
//!
//! let module: BarcodeModule = "disc".parse().unwrap();
//!
//! let error = DomainError::LotNotFound {
//!     lot_id: "0190a1b2-0000-7000-8000-000000000000".to_string(),
//! };
//! assert_eq!(module.default_prefix(), "DIS");
//! assert!(error.to_string().starts_with("ロットが見つかりません"));
//! ```

#[macro_use]
mod macros;

pub mod barcode;
pub mod clock;
pub mod error;
pub mod value_objects;

pub use error::DomainError;
