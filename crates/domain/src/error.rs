//! # ドメイン層エラー定義
//!
//! 採番・予約・状態遷移のビジネスルール違反を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **文脈の保持**: 各バリアントはモジュール・コード・ロット ID を保持し、
//!   呼び出し側が具体的なメッセージを組み立てられるようにする
//! - **リトライしない**: ここに列挙されるのは呼び出し側の誤りか想定内の業務状態であり、
//!   一時的な障害ではない
//!
//! ## エラーの種類と HTTP ステータスの対応（コントローラ側の目安）
//!
//! | エラー種別 | HTTP ステータス |
//! |-----------|----------------|
//! | `Validation`, `InvalidModule`, `InvalidQuantity`, `ModuleMismatch` | 400 Bad Request |
//! | `CodeNotFound`, `LotNotFound` | 404 Not Found |
//! | `FormatLocked`, `AlreadyUsed`, `AlreadyBurned`, `AlreadyCancelled`, `CodeCancelled`, `NotCancelled`, `LotAlreadyCancelled` | 409 Conflict |
//! | `SequenceExhausted`, `LotCounterMismatch` | 500 Internal Server Error |
//!
//! ## 使用例
//!
//! ```rust
//! use ludo_domain::{DomainError, barcode::BarcodeModule};
//!
//! let error = DomainError::CodeNotFound {
//!     module: BarcodeModule::Game,
//!     code:   "JEU00000042".to_string(),
//! };
//! assert_eq!(error.to_string(), "コードが見つかりません: game/JEU00000042");
//! ```

use thiserror::Error;

use crate::{
    barcode::{BarcodeModule, CodeStatus},
    value_objects::EntityId,
};

/// ドメイン層で発生するエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 書式パターンやプレフィックスなど、入力値が規則に違反している場合に使用する。
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 不明なモジュール名
    #[error("不正なモジュールです: {0}")]
    InvalidModule(String),

    /// 予約数が許容範囲外
    #[error("予約数は {min} 以上 {max} 以下である必要があります（指定: {requested}）")]
    InvalidQuantity {
        requested: i64,
        min:       u32,
        max:       u32,
    },

    /// ロック済み書式の構造的な変更
    ///
    /// 一度でもコードを発行した書式は、印刷済みラベルとの整合性のため
    /// `pattern` / `prefix` / `sequence_reset` を変更できない。
    #[error("{module} の書式はロックされているため {field} を変更できません")]
    FormatLocked {
        module: BarcodeModule,
        field:  &'static str,
    },

    /// コードが存在しない
    ///
    /// `code` には検索に使った値（コード文字列または ID）が入る。
    #[error("コードが見つかりません: {module}/{code}")]
    CodeNotFound {
        module: BarcodeModule,
        code:   String,
    },

    /// 使用済みコードへの操作
    #[error("コードは既に使用されています: {module}/{code}")]
    AlreadyUsed {
        module:    BarcodeModule,
        code:      String,
        entity_id: Option<EntityId>,
    },

    /// 焼却済みコードへの操作
    #[error("コードは焼却済みです: {module}/{code}")]
    AlreadyBurned {
        module: BarcodeModule,
        code:   String,
    },

    /// 取消済みコードの再取消（焼却指定なし）
    #[error("コードは既に取り消されています: {module}/{code}")]
    AlreadyCancelled {
        module: BarcodeModule,
        code:   String,
    },

    /// 取消済みコードへの割り当て
    ///
    /// 先に復元（restore）してから割り当てる必要がある。
    #[error("取り消されたコードは割り当てできません（先に復元が必要）: {module}/{code}")]
    CodeCancelled {
        module: BarcodeModule,
        code:   String,
    },

    /// 取消状態ではないコードの復元
    #[error("取り消されていないコードは復元できません: {module}/{code}（現在: {status}）")]
    NotCancelled {
        module: BarcodeModule,
        code:   String,
        status: CodeStatus,
    },

    /// コードのプレフィックスが別モジュールのもの
    #[error("コード {code} は {actual} のものであり {expected} には割り当てできません")]
    ModuleMismatch {
        expected: BarcodeModule,
        actual:   BarcodeModule,
        code:     String,
    },

    /// ロットが存在しない
    #[error("ロットが見つかりません: {lot_id}")]
    LotNotFound { lot_id: String },

    /// 取消済みロットの再取消
    #[error("ロットは既に取り消されています: {lot_id}")]
    LotAlreadyCancelled { lot_id: String },

    /// 衝突スキップの上限超過
    ///
    /// 実運用ではまず到達しないが、無限ループの代わりに明示的に失敗させる。
    #[error(
        "{module} の連番を確保できません: {skipped} 件の衝突をスキップしました（最終候補: {last_sequence}）"
    )]
    SequenceExhausted {
        module:        BarcodeModule,
        skipped:       usize,
        last_sequence: i64,
    },

    /// ロットのカウンター不整合
    ///
    /// 自動補正はせず、必ず呼び出し側に通知する。
    #[error("ロット {lot_id} のカウンターが不整合です: {detail}")]
    LotCounterMismatch { lot_id: String, detail: String },
}
