//! # ロット
//!
//! 一括予約の単位。予約したコード範囲と、使用・取消の集計カウンターを持つ。
//!
//! カウンターはコードの状態遷移と同じトランザクションで明示的に更新する。
//! コードテーブルを走査して再計算することはしない。
//!
//! ## 不変条件
//!
//! - `used_count + cancelled_count <= quantity`
//! - `used_count == quantity` になった時点で `completed_at` が記録される

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{BarcodeContext, BarcodeModule};
use crate::{
    DomainError,
    value_objects::{ActorId, LotQuantity},
};

define_uuid_id! {
    /// ロット ID
    pub struct LotId;
}

/// ロットステータス
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LotStatus {
    /// 有効
    Active,
    /// 取消済み
    Cancelled,
}

impl std::str::FromStr for LotStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(DomainError::Validation(format!("不正なロットステータス: {s}"))),
        }
    }
}

/// ロットエンティティ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lot {
    id: LotId,
    module: BarcodeModule,
    context: BarcodeContext,
    quantity: u32,
    first_code: String,
    last_code: String,
    status: LotStatus,
    used_count: u32,
    cancelled_count: u32,
    created_by: Option<ActorId>,
    created_at: DateTime<Utc>,
    printed_at: Option<DateTime<Utc>>,
    reprint_count: u32,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// ロットの新規作成パラメータ
pub struct NewLot {
    pub id: LotId,
    pub module: BarcodeModule,
    pub context: BarcodeContext,
    pub quantity: LotQuantity,
    pub first_code: String,
    pub last_code: String,
    pub created_by: Option<ActorId>,
    pub now: DateTime<Utc>,
}

/// ロットの DB 復元パラメータ
pub struct LotData {
    pub id: LotId,
    pub module: BarcodeModule,
    pub context: BarcodeContext,
    pub quantity: u32,
    pub first_code: String,
    pub last_code: String,
    pub status: LotStatus,
    pub used_count: u32,
    pub cancelled_count: u32,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub printed_at: Option<DateTime<Utc>>,
    pub reprint_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    /// 新しいロットを作成する
    pub fn new(params: NewLot) -> Self {
        Self {
            id: params.id,
            module: params.module,
            context: params.context,
            quantity: params.quantity.as_u32(),
            first_code: params.first_code,
            last_code: params.last_code,
            status: LotStatus::Active,
            used_count: 0,
            cancelled_count: 0,
            created_by: params.created_by,
            created_at: params.now,
            printed_at: None,
            reprint_count: 0,
            completed_at: None,
            cancelled_at: None,
            updated_at: params.now,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(data: LotData) -> Self {
        Self {
            id: data.id,
            module: data.module,
            context: data.context,
            quantity: data.quantity,
            first_code: data.first_code,
            last_code: data.last_code,
            status: data.status,
            used_count: data.used_count,
            cancelled_count: data.cancelled_count,
            created_by: data.created_by,
            created_at: data.created_at,
            printed_at: data.printed_at,
            reprint_count: data.reprint_count,
            completed_at: data.completed_at,
            cancelled_at: data.cancelled_at,
            updated_at: data.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &LotId {
        &self.id
    }

    pub fn module(&self) -> BarcodeModule {
        self.module
    }

    pub fn context(&self) -> BarcodeContext {
        self.context
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn first_code(&self) -> &str {
        &self.first_code
    }

    pub fn last_code(&self) -> &str {
        &self.last_code
    }

    pub fn status(&self) -> LotStatus {
        self.status
    }

    pub fn used_count(&self) -> u32 {
        self.used_count
    }

    pub fn cancelled_count(&self) -> u32 {
        self.cancelled_count
    }

    pub fn created_by(&self) -> Option<&ActorId> {
        self.created_by.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn printed_at(&self) -> Option<DateTime<Utc>> {
        self.printed_at
    }

    pub fn reprint_count(&self) -> u32 {
        self.reprint_count
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// すべてのコードが使用済みかどうか
    pub fn is_complete(&self) -> bool {
        self.used_count == self.quantity
    }

    /// まだ使用も取消もされていないコード数
    pub fn remaining(&self) -> u32 {
        self.quantity
            .saturating_sub(self.used_count)
            .saturating_sub(self.cancelled_count)
    }

    /// 有効なロットであることを確認する
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        match self.status {
            LotStatus::Active => Ok(()),
            LotStatus::Cancelled => Err(DomainError::LotAlreadyCancelled {
                lot_id: self.id.to_string(),
            }),
        }
    }

    // 状態遷移メソッド

    /// コード 1 件の使用を記録する
    ///
    /// 使用数が数量に達したら完了日時を記録する。
    pub fn record_use(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let used_count = self.used_count + 1;
        self.check_counters(used_count, self.cancelled_count)?;

        let completed_at = match self.completed_at {
            None if used_count == self.quantity => Some(now),
            completed_at => completed_at,
        };

        Ok(Self {
            used_count,
            completed_at,
            updated_at: now,
            ..self
        })
    }

    /// コード 1 件の取消（焼却を含む）を記録する
    pub fn record_cancellation(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let cancelled_count = self.cancelled_count + 1;
        self.check_counters(self.used_count, cancelled_count)?;

        Ok(Self {
            cancelled_count,
            updated_at: now,
            ..self
        })
    }

    /// コード 1 件の復元を記録する
    pub fn record_restoration(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let Some(cancelled_count) = self.cancelled_count.checked_sub(1) else {
            return Err(self.mismatch("取消数が 0 のロットで復元が要求されました".to_string()));
        };

        Ok(Self {
            cancelled_count,
            updated_at: now,
            ..self
        })
    }

    /// ロットを取り消す
    ///
    /// `transitioned` はこの操作で取消（焼却）に遷移したコード数。
    pub fn cancelled(self, transitioned: u32, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.ensure_active()?;
        let cancelled_count = self.cancelled_count + transitioned;
        self.check_counters(self.used_count, cancelled_count)?;

        Ok(Self {
            status: LotStatus::Cancelled,
            cancelled_count,
            cancelled_at: Some(now),
            updated_at: now,
            ..self
        })
    }

    /// 印刷を記録する
    ///
    /// 初回は印刷日時を、2 回目以降は再印刷回数を更新する。
    pub fn printed(self, now: DateTime<Utc>) -> Self {
        match self.printed_at {
            None => Self {
                printed_at: Some(now),
                updated_at: now,
                ..self
            },
            Some(_) => Self {
                reprint_count: self.reprint_count + 1,
                updated_at: now,
                ..self
            },
        }
    }

    fn check_counters(&self, used_count: u32, cancelled_count: u32) -> Result<(), DomainError> {
        if used_count + cancelled_count > self.quantity {
            return Err(self.mismatch(format!(
                "使用 {used_count} + 取消 {cancelled_count} が数量 {} を超えます",
                self.quantity
            )));
        }
        Ok(())
    }

    fn mismatch(&self, detail: String) -> DomainError {
        DomainError::LotCounterMismatch {
            lot_id: self.id.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap()
    }

    fn lot_of(quantity: i64, now: DateTime<Utc>) -> Lot {
        Lot::new(NewLot {
            id: LotId::new(),
            module: BarcodeModule::Game,
            context: BarcodeContext::global(),
            quantity: LotQuantity::new(quantity).unwrap(),
            first_code: "JEU00000001".to_string(),
            last_code: "JEU00000003".to_string(),
            created_by: Some(ActorId::new()),
            now,
        })
    }

    #[rstest]
    fn test_新規ロットは有効でカウンターが0(now: DateTime<Utc>) {
        let lot = lot_of(3, now);

        assert_eq!(lot.status(), LotStatus::Active);
        assert_eq!(lot.used_count(), 0);
        assert_eq!(lot.cancelled_count(), 0);
        assert_eq!(lot.remaining(), 3);
        assert!(!lot.is_complete());
    }

    #[rstest]
    fn test_全件使用で完了日時が記録される(now: DateTime<Utc>) {
        let later = now + chrono::Duration::minutes(5);
        let lot = lot_of(2, now).record_use(now).unwrap();
        assert_eq!(lot.completed_at(), None);

        let lot = lot.record_use(later).unwrap();

        assert!(lot.is_complete());
        assert_eq!(lot.completed_at(), Some(later));
        assert_eq!(lot.remaining(), 0);
    }

    #[rstest]
    fn test_取消と使用の合計が数量を超えるとcounter_mismatch(now: DateTime<Utc>) {
        let lot = lot_of(1, now).record_cancellation(now).unwrap();

        let result = lot.record_use(now);

        assert!(matches!(result, Err(DomainError::LotCounterMismatch { .. })));
    }

    #[rstest]
    fn test_取消数0での復元はcounter_mismatch(now: DateTime<Utc>) {
        let result = lot_of(3, now).record_restoration(now);

        assert!(matches!(result, Err(DomainError::LotCounterMismatch { .. })));
    }

    #[rstest]
    fn test_取消と復元でカウンターが戻る(now: DateTime<Utc>) {
        let lot = lot_of(3, now);
        let restored = lot
            .clone()
            .record_cancellation(now)
            .unwrap()
            .record_restoration(now)
            .unwrap();

        assert_eq!(restored, lot);
    }

    #[rstest]
    fn test_ロット取消は既存の取消数に加算する(now: DateTime<Utc>) {
        let lot = lot_of(5, now)
            .record_use(now)
            .unwrap()
            .record_cancellation(now)
            .unwrap();

        let cancelled = lot.cancelled(3, now).unwrap();

        assert_eq!(cancelled.status(), LotStatus::Cancelled);
        assert_eq!(cancelled.cancelled_count(), 4);
        assert_eq!(cancelled.used_count(), 1);
        assert_eq!(cancelled.cancelled_at(), Some(now));
    }

    #[rstest]
    fn test_取消済みロットの再取消はエラー(now: DateTime<Utc>) {
        let lot = lot_of(3, now).cancelled(3, now).unwrap();
        let lot_id = lot.id().to_string();

        assert_eq!(
            lot.cancelled(0, now),
            Err(DomainError::LotAlreadyCancelled { lot_id })
        );
    }

    #[rstest]
    fn test_印刷は初回のみ日時を記録し以降は再印刷回数を増やす(now: DateTime<Utc>) {
        let later = now + chrono::Duration::days(1);

        let lot = lot_of(3, now).printed(now);
        assert_eq!(lot.printed_at(), Some(now));
        assert_eq!(lot.reprint_count(), 0);

        let lot = lot.printed(later).printed(later);
        assert_eq!(lot.printed_at(), Some(now));
        assert_eq!(lot.reprint_count(), 2);
    }

    #[test]
    fn test_ステータスの文字列変換() {
        assert_eq!("cancelled".parse::<LotStatus>().unwrap(), LotStatus::Cancelled);
        assert_eq!(LotStatus::Active.to_string(), "active");
        assert!("deleted".parse::<LotStatus>().is_err());
    }
}
