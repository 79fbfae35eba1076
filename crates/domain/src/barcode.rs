//! # バーコード採番ドメイン
//!
//! 会員・ゲーム・書籍・映画・ディスクの各モジュールに発行する識別コードの
//! 書式設定、連番の割り当て、ロット（一括予約）、コードのライフサイクル、
//! スキャン時の判定を扱う。
//!
//! ## 構成
//!
//! ```text
//! module / context        … モジュール種別と採番コンテキスト（組織・拠点・グループ）
//!   └ pattern             … 書式トークンの解釈とレンダリング
//!       └ format_config   … 書式設定エンティティ（ロック・期間リセット）
//!           └ allocator   … 衝突をスキップしながら空き連番を探す純粋ロジック
//! lot / code              … ロットとコードレコードの状態遷移
//! scan                    … スキャン入力からモジュールと状態を判定
//! ```
//!
//! 状態遷移は常に「self を消費して新しいインスタンスを返す」形で表現し、
//! 永続化とカウンター更新はユースケース層が同一トランザクションで行う。

mod allocator;
mod code;
mod context;
mod format_config;
mod lot;
mod module;
mod pattern;
mod scan;

pub use allocator::{Allocation, Candidate, DEFAULT_COLLISION_BUDGET, SequenceAllocator, SequenceProbe};
pub use code::{CodeRecord, CodeRecordData, CodeRecordId, CodeRef, CodeStatus, NewReservedCode};
pub use context::BarcodeContext;
pub use format_config::{
    FormatConfig,
    FormatConfigData,
    FormatConfigId,
    FormatConfigPatch,
    SequenceReset,
};
pub use lot::{Lot, LotData, LotId, LotStatus, NewLot};
pub use module::BarcodeModule;
pub use pattern::{
    DEFAULT_PATTERN,
    FALLBACK_SEQUENCE_WIDTH,
    MAX_PATTERN_LENGTH,
    PREFIX_LENGTH,
    Token,
    render,
    validate_pattern,
    validate_prefix,
};
pub use scan::{PrefixTable, ScanResolver, ScanResult, ScanVerdict};
