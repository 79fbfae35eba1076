//! # ユースケース層
//!
//! 採番サービスのビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリを `Arc<dyn Trait>` で外部から注入
//! - **薄いコントローラ**: 呼び出し側は入力の変換とステータスの対応付けだけを行い、
//!   ロジックはユースケースに集約する
//!
//! ## モジュール構成
//!
//! - `barcode`: 書式設定・ロット予約・コードのライフサイクル・スキャン判定

pub(crate) mod helpers;

pub mod barcode;

pub use barcode::{
    AssignCodeInput,
    AssignedCode,
    BarcodeUseCaseImpl,
    CodePreview,
    ListLotsInput,
    LotCancellation,
    LotDetail,
    LotStats,
    ReservationSettings,
    ReserveLotInput,
    ReservedLot,
};
