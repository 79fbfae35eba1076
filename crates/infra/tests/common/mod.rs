//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するエンティティ生成ヘルパー。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ludo_domain::{
    barcode::{
        BarcodeContext,
        BarcodeModule,
        CodeRecord,
        CodeRecordId,
        Lot,
        LotId,
        NewLot,
        NewReservedCode,
    },
    value_objects::{ActorId, LotQuantity},
};

/// テスト用の固定時刻
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap()
}

/// `JEU00000001` から `quantity` 件の予約済みロットとコードを作る
pub fn create_test_lot(module: BarcodeModule, quantity: i64) -> (Lot, Vec<CodeRecord>) {
    let now = test_now();
    let prefix = module.default_prefix();
    let lot_id = LotId::new();
    let codes: Vec<CodeRecord> = (1..=quantity)
        .map(|sequence| {
            CodeRecord::reserved(NewReservedCode {
                id: CodeRecordId::new(),
                module,
                code: format!("{prefix}{sequence:08}"),
                sequence,
                lot_id: lot_id.clone(),
                now,
            })
        })
        .collect();
    let lot = Lot::new(NewLot {
        id: lot_id,
        module,
        context: BarcodeContext::global(),
        quantity: LotQuantity::new(quantity).unwrap(),
        first_code: codes.first().unwrap().code().to_string(),
        last_code: codes.last().unwrap().code().to_string(),
        created_by: Some(ActorId::new()),
        now,
    });
    (lot, codes)
}
