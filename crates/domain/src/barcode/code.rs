//! # コードレコード
//!
//! 発行したコード文字列 1 件ごとの状態を表す。
//! モジュールごとに別テーブルに保存されるが、ドメイン上は単一の型で扱う。
//!
//! ## 状態遷移
//!
//! ```text
//!             assign                cancel(burn)
//!  reserved ─────────→ used   ┌──────────────────→ burned
//!     │  ↑                    │                      ↑
//!     │  │ restore            │                      │ cancel(burn)
//!     │  │                    │                      │
//!     └──┴────────────────→ cancelled ───────────────┘
//!         cancel
//! ```
//!
//! `used` と `burned` は終端状態。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{BarcodeModule, LotId};
use crate::{DomainError, value_objects::EntityId};

define_uuid_id! {
    /// コードレコード ID
    pub struct CodeRecordId;
}

/// コードステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CodeStatus {
    /// 予約済み（割り当て待ち）
    Reserved,
    /// 使用済み
    Used,
    /// 取消済み（復元可能）
    Cancelled,
    /// 焼却済み（再利用不可）
    Burned,
}

impl CodeStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::str::FromStr for CodeStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(Self::Reserved),
            "used" => Ok(Self::Used),
            "cancelled" => Ok(Self::Cancelled),
            "burned" => Ok(Self::Burned),
            _ => Err(DomainError::Validation(format!("不正なコードステータス: {s}"))),
        }
    }
}

/// コードの指定方法（コード文字列または ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeRef {
    Code(String),
    Id(CodeRecordId),
}

impl std::fmt::Display for CodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// コードレコードエンティティ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeRecord {
    id: CodeRecordId,
    module: BarcodeModule,
    code: String,
    sequence: Option<i64>,
    lot_id: Option<LotId>,
    status: CodeStatus,
    entity_id: Option<EntityId>,
    reserved_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// ロット予約で発行するコードの作成パラメータ
pub struct NewReservedCode {
    pub id: CodeRecordId,
    pub module: BarcodeModule,
    pub code: String,
    pub sequence: i64,
    pub lot_id: LotId,
    pub now: DateTime<Utc>,
}

/// コードレコードの DB 復元パラメータ
pub struct CodeRecordData {
    pub id: CodeRecordId,
    pub module: BarcodeModule,
    pub code: String,
    pub sequence: Option<i64>,
    pub lot_id: Option<LotId>,
    pub status: CodeStatus,
    pub entity_id: Option<EntityId>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CodeRecord {
    /// ロット予約で発行された予約済みコードを作成する
    pub fn reserved(params: NewReservedCode) -> Self {
        Self {
            id: params.id,
            module: params.module,
            code: params.code,
            sequence: Some(params.sequence),
            lot_id: Some(params.lot_id),
            status: CodeStatus::Reserved,
            entity_id: None,
            reserved_at: Some(params.now),
            used_at: None,
            cancelled_at: None,
            updated_at: params.now,
        }
    }

    /// 予約なしで直接割り当てられた使用済みコードを作成する
    pub fn ad_hoc_used(
        module: BarcodeModule,
        code: String,
        entity_id: EntityId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CodeRecordId::new(),
            module,
            code,
            sequence: None,
            lot_id: None,
            status: CodeStatus::Used,
            entity_id: Some(entity_id),
            reserved_at: None,
            used_at: Some(now),
            cancelled_at: None,
            updated_at: now,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(data: CodeRecordData) -> Self {
        Self {
            id: data.id,
            module: data.module,
            code: data.code,
            sequence: data.sequence,
            lot_id: data.lot_id,
            status: data.status,
            entity_id: data.entity_id,
            reserved_at: data.reserved_at,
            used_at: data.used_at,
            cancelled_at: data.cancelled_at,
            updated_at: data.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &CodeRecordId {
        &self.id
    }

    pub fn module(&self) -> BarcodeModule {
        self.module
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn sequence(&self) -> Option<i64> {
        self.sequence
    }

    pub fn lot_id(&self) -> Option<&LotId> {
        self.lot_id.as_ref()
    }

    pub fn status(&self) -> CodeStatus {
        self.status
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity_id
    }

    pub fn reserved_at(&self) -> Option<DateTime<Utc>> {
        self.reserved_at
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // 状態遷移メソッド

    /// エンティティに割り当てる（reserved → used）
    pub fn assigned(self, entity_id: EntityId, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.status {
            CodeStatus::Reserved => Ok(Self {
                status: CodeStatus::Used,
                entity_id: Some(entity_id),
                used_at: Some(now),
                updated_at: now,
                ..self
            }),
            CodeStatus::Cancelled => Err(DomainError::CodeCancelled {
                module: self.module,
                code:   self.code,
            }),
            _ => Err(self.terminal_error()),
        }
    }

    /// 取り消す（reserved → cancelled / burned）
    ///
    /// 取消済みのコードは焼却指定がある場合のみ burned に進める。
    /// その場合 `cancelled_at` は最初の取消日時のまま。
    pub fn cancelled(self, burn: bool, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let next = if burn {
            CodeStatus::Burned
        } else {
            CodeStatus::Cancelled
        };

        match self.status {
            CodeStatus::Reserved => Ok(Self {
                status: next,
                cancelled_at: Some(now),
                updated_at: now,
                ..self
            }),
            CodeStatus::Cancelled if burn => Ok(Self {
                status: CodeStatus::Burned,
                updated_at: now,
                ..self
            }),
            CodeStatus::Cancelled => Err(DomainError::AlreadyCancelled {
                module: self.module,
                code:   self.code,
            }),
            _ => Err(self.terminal_error()),
        }
    }

    /// 復元する（cancelled → reserved）
    pub fn restored(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.status {
            CodeStatus::Cancelled => Ok(Self {
                status: CodeStatus::Reserved,
                cancelled_at: None,
                updated_at: now,
                ..self
            }),
            status => Err(DomainError::NotCancelled {
                module: self.module,
                code: self.code,
                status,
            }),
        }
    }

    /// 終端状態（used / burned）に対する操作のエラー
    fn terminal_error(self) -> DomainError {
        match self.status {
            CodeStatus::Burned => DomainError::AlreadyBurned {
                module: self.module,
                code:   self.code,
            },
            _ => DomainError::AlreadyUsed {
                module:    self.module,
                code:      self.code,
                entity_id: self.entity_id,
            },
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

    #[fixture]
    fn reserved(now: DateTime<Utc>) -> CodeRecord {
        CodeRecord::reserved(NewReservedCode {
            id: CodeRecordId::new(),
            module: BarcodeModule::Game,
            code: "JEU00000001".to_string(),
            sequence: 1,
            lot_id: LotId::new(),
            now,
        })
    }

    fn entity() -> EntityId {
        EntityId::new(42).unwrap()
    }

    /// 指定ステータスのコードを遷移で作る
    fn in_status(record: CodeRecord, status: CodeStatus, now: DateTime<Utc>) -> CodeRecord {
        match status {
            CodeStatus::Reserved => record,
            CodeStatus::Used => record.assigned(entity(), now).unwrap(),
            CodeStatus::Cancelled => record.cancelled(false, now).unwrap(),
            CodeStatus::Burned => record.cancelled(true, now).unwrap(),
        }
    }

    #[rstest]
    fn test_予約済みコードを割り当てると使用済みになる(reserved: CodeRecord, now: DateTime<Utc>) {
        let used = reserved.assigned(entity(), now).unwrap();

        assert_eq!(used.status(), CodeStatus::Used);
        assert_eq!(used.entity_id(), Some(entity()));
        assert_eq!(used.used_at(), Some(now));
    }

    #[rstest]
    #[case(CodeStatus::Used, "already_used")]
    #[case(CodeStatus::Cancelled, "code_cancelled")]
    #[case(CodeStatus::Burned, "already_burned")]
    fn test_予約済み以外への割り当てはエラー(
        reserved: CodeRecord,
        now: DateTime<Utc>,
        #[case] status: CodeStatus,
        #[case] expected: &str,
    ) {
        let record = in_status(reserved, status, now);

        let kind = match record.assigned(entity(), now) {
            Err(DomainError::AlreadyUsed { .. }) => "already_used",
            Err(DomainError::CodeCancelled { .. }) => "code_cancelled",
            Err(DomainError::AlreadyBurned { .. }) => "already_burned",
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(kind, expected);
    }

    #[rstest]
    #[case(false, CodeStatus::Cancelled)]
    #[case(true, CodeStatus::Burned)]
    fn test_予約済みコードを取り消す(
        reserved: CodeRecord,
        now: DateTime<Utc>,
        #[case] burn: bool,
        #[case] expected: CodeStatus,
    ) {
        let cancelled = reserved.cancelled(burn, now).unwrap();

        assert_eq!(cancelled.status(), expected);
        assert_eq!(cancelled.cancelled_at(), Some(now));
    }

    #[rstest]
    fn test_取消済みコードは焼却指定でのみ焼却できる(reserved: CodeRecord, now: DateTime<Utc>) {
        let later = now + chrono::Duration::hours(1);
        let cancelled = reserved.cancelled(false, now).unwrap();

        assert!(matches!(
            cancelled.clone().cancelled(false, later),
            Err(DomainError::AlreadyCancelled { .. })
        ));

        let burned = cancelled.cancelled(true, later).unwrap();
        assert_eq!(burned.status(), CodeStatus::Burned);
        assert_eq!(burned.cancelled_at(), Some(now));
    }

    #[rstest]
    #[case(CodeStatus::Used)]
    #[case(CodeStatus::Burned)]
    fn test_終端状態は取り消せない(
        reserved: CodeRecord,
        now: DateTime<Utc>,
        #[case] status: CodeStatus,
    ) {
        let record = in_status(reserved, status, now);

        let result = record.cancelled(true, now);

        match status {
            CodeStatus::Used => assert!(matches!(result, Err(DomainError::AlreadyUsed { .. }))),
            _ => assert!(matches!(result, Err(DomainError::AlreadyBurned { .. }))),
        }
    }

    #[rstest]
    fn test_取消してから復元すると元に戻る(reserved: CodeRecord, now: DateTime<Utc>) {
        let restored = reserved
            .clone()
            .cancelled(false, now)
            .unwrap()
            .restored(now)
            .unwrap();

        assert_eq!(restored, reserved);
    }

    #[rstest]
    #[case(CodeStatus::Reserved)]
    #[case(CodeStatus::Used)]
    #[case(CodeStatus::Burned)]
    fn test_取消状態以外は復元できない(
        reserved: CodeRecord,
        now: DateTime<Utc>,
        #[case] status: CodeStatus,
    ) {
        let record = in_status(reserved, status, now);

        assert_eq!(
            record.restored(now),
            Err(DomainError::NotCancelled {
                module: BarcodeModule::Game,
                code: "JEU00000001".to_string(),
                status,
            })
        );
    }

    #[rstest]
    fn test_アドホック割り当てはロットなしの使用済みコードになる(now: DateTime<Utc>) {
        let record = CodeRecord::ad_hoc_used(
            BarcodeModule::Member,
            "USA00000007".to_string(),
            entity(),
            now,
        );

        assert_eq!(record.status(), CodeStatus::Used);
        assert_eq!(record.lot_id(), None);
        assert_eq!(record.sequence(), None);
        assert_eq!(record.reserved_at(), None);
        assert_eq!(record.used_at(), Some(now));
    }

    #[test]
    fn test_ステータスの文字列変換() {
        assert_eq!("burned".parse::<CodeStatus>().unwrap(), CodeStatus::Burned);
        assert_eq!(CodeStatus::Reserved.as_str(), "reserved");
        assert_eq!(CodeStatus::Cancelled.to_string(), "cancelled");
        assert!("lost".parse::<CodeStatus>().is_err());
    }
}
