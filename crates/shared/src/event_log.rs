//! # ビジネスイベントログの構造化ヘルパー
//!
//! 採番・予約・状態遷移など、後から `jq` で追跡したい出来事を
//! 一定のフィールド命名規約で出力するためのマクロと定数を提供する。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`event.action`）を使用する。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。
//!
//! ```rust,ignore
//! log_business_event!(
//!     event.category = event::category::BARCODE,
//!     event.action = event::action::LOT_RESERVED,
//!     event.entity_type = event::entity_type::LOT,
//!     event.entity_id = %lot.id(),
//!     event.module = %lot.module(),
//!     event.result = event::result::SUCCESS,
//!     "ロットを予約"
//! );
//! ```

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: [`event::category`] の定数
/// - `event.action`: [`event::action`] の定数
/// - `event.module`: 対象モジュール（`game`, `book` など）
/// - `event.result`: [`event::result`] の定数
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const BARCODE: &str = "barcode";
    }

    /// イベントアクション
    pub mod action {
        // 書式設定
        pub const FORMAT_UPDATED: &str = "barcode.format_updated";

        // ロット
        pub const LOT_RESERVED: &str = "barcode.lot_reserved";
        pub const LOT_CANCELLED: &str = "barcode.lot_cancelled";
        pub const LOT_PRINTED: &str = "barcode.lot_printed";
        pub const LOT_COMPLETED: &str = "barcode.lot_completed";

        // コード
        pub const CODE_ASSIGNED: &str = "barcode.code_assigned";
        pub const CODE_CANCELLED: &str = "barcode.code_cancelled";
        pub const CODE_BURNED: &str = "barcode.code_burned";
        pub const CODE_RESTORED: &str = "barcode.code_restored";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const FORMAT_CONFIG: &str = "format_config";
        pub const LOT: &str = "lot";
        pub const CODE: &str = "code";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
    }
}

/// エラーコンテキストフィールドの定数
///
/// `tracing::error!` / `tracing::warn!` に `error.category` + `error.kind` を付与する。
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 業務ルール違反（状態遷移の拒否など）
        pub const BUSINESS_RULE: &str = "business_rule";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const RETRY_EXHAUSTED: &str = "retry_exhausted";
        pub const COUNTER_MISMATCH: &str = "counter_mismatch";
    }
}
