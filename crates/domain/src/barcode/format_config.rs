//! # 書式設定
//!
//! モジュール（とコンテキスト）ごとのコード書式と連番カウンターを管理する。
//!
//! ## 不変条件
//!
//! - `current_sequence` は期間内で単調増加する
//! - 期間が変わったとき、最初の割り当てと同時に一度だけ 0 に戻る
//! - ロック後は `pattern` / `prefix` / `sequence_reset` を変更できない
//!
//! ロックは最初のロット予約が成功した時点で自動的にかかる。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{
    BarcodeContext,
    BarcodeModule,
    pattern::{self, DEFAULT_PATTERN, FALLBACK_SEQUENCE_WIDTH},
};
use crate::{DomainError, value_objects::EntityId};

define_uuid_id! {
    /// 書式設定 ID
    pub struct FormatConfigId;
}

/// 連番のリセット周期
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SequenceReset {
    /// リセットしない
    #[default]
    Never,
    /// 毎年
    Yearly,
    /// 毎月
    Monthly,
    /// 毎日
    Daily,
}

impl SequenceReset {
    /// 指定日が属する期間のマーカー
    ///
    /// `Never` は期間を持たないため `None`。
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use ludo_domain::barcode::SequenceReset;
    ///
    /// let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
    /// assert_eq!(SequenceReset::Monthly.period_marker(date).as_deref(), Some("2026-03"));
    /// assert_eq!(SequenceReset::Never.period_marker(date), None);
    /// ```
    pub fn period_marker(&self, date: NaiveDate) -> Option<String> {
        match self {
            Self::Never => None,
            Self::Yearly => Some(date.format("%Y").to_string()),
            Self::Monthly => Some(date.format("%Y-%m").to_string()),
            Self::Daily => Some(date.format("%Y-%m-%d").to_string()),
        }
    }
}

impl std::str::FromStr for SequenceReset {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "yearly" => Ok(Self::Yearly),
            "monthly" => Ok(Self::Monthly),
            "daily" => Ok(Self::Daily),
            _ => Err(DomainError::Validation(format!("不正なリセット周期: {s}"))),
        }
    }
}

/// 書式設定の部分更新
///
/// `None` のフィールドは変更しない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FormatConfigPatch {
    pub pattern:        Option<String>,
    pub prefix:         Option<String>,
    pub sequence_reset: Option<SequenceReset>,
    pub burn_on_cancel: Option<bool>,
}

/// 書式設定エンティティ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatConfig {
    id: FormatConfigId,
    module: BarcodeModule,
    context: BarcodeContext,
    pattern: String,
    prefix: String,
    sequence_reset: SequenceReset,
    current_sequence: i64,
    current_period: Option<String>,
    locked: bool,
    burn_on_cancel: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// 書式設定の DB 復元パラメータ
pub struct FormatConfigData {
    pub id: FormatConfigId,
    pub module: BarcodeModule,
    pub context: BarcodeContext,
    pub pattern: String,
    pub prefix: String,
    pub sequence_reset: SequenceReset,
    pub current_sequence: i64,
    pub current_period: Option<String>,
    pub locked: bool,
    pub burn_on_cancel: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormatConfig {
    /// モジュール既定値で新しい書式設定を作成する
    pub fn with_defaults(
        module: BarcodeModule,
        context: BarcodeContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FormatConfigId::new(),
            module,
            context,
            pattern: DEFAULT_PATTERN.to_string(),
            prefix: module.default_prefix().to_string(),
            sequence_reset: SequenceReset::Never,
            current_sequence: 0,
            current_period: None,
            locked: false,
            burn_on_cancel: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(data: FormatConfigData) -> Self {
        Self {
            id: data.id,
            module: data.module,
            context: data.context,
            pattern: data.pattern,
            prefix: data.prefix,
            sequence_reset: data.sequence_reset,
            current_sequence: data.current_sequence,
            current_period: data.current_period,
            locked: data.locked,
            burn_on_cancel: data.burn_on_cancel,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &FormatConfigId {
        &self.id
    }

    pub fn module(&self) -> BarcodeModule {
        self.module
    }

    pub fn context(&self) -> BarcodeContext {
        self.context
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sequence_reset(&self) -> SequenceReset {
        self.sequence_reset
    }

    pub fn current_sequence(&self) -> i64 {
        self.current_sequence
    }

    pub fn current_period(&self) -> Option<&str> {
        self.current_period.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn burn_on_cancel(&self) -> bool {
        self.burn_on_cancel
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 次に試す連番
    pub fn next_sequence(&self) -> i64 {
        self.current_sequence.saturating_add(1)
    }

    /// 指定連番のコードを生成する
    pub fn render(&self, sequence: i64, date: NaiveDate) -> String {
        pattern::render(&self.pattern, sequence, &self.prefix, date)
    }

    /// コード未指定で割り当てるときのフォールバックコード
    ///
    /// プレフィックスの後にエンティティ ID を 8 桁ゼロ埋めで続ける。
    pub fn fallback_code(&self, entity_id: EntityId) -> String {
        format!(
            "{}{:0width$}",
            self.prefix,
            entity_id.as_i64(),
            width = FALLBACK_SEQUENCE_WIDTH
        )
    }

    /// 部分更新を適用する
    ///
    /// ロック済みの場合、構造的なフィールド（pattern / prefix / sequence_reset）を
    /// 現在と異なる値に変更しようとすると [`DomainError::FormatLocked`] を返す。
    /// `burn_on_cancel` はロック後も変更できる。
    pub fn apply_patch(
        self,
        patch: FormatConfigPatch,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let pattern = match patch.pattern {
            Some(pattern) => {
                pattern::validate_pattern(&pattern)?;
                pattern
            }
            None => self.pattern.clone(),
        };
        let prefix = match patch.prefix {
            Some(prefix) => pattern::validate_prefix(&prefix)?,
            None => self.prefix.clone(),
        };
        let sequence_reset = patch.sequence_reset.unwrap_or(self.sequence_reset);

        if self.locked {
            let changed = [
                ("pattern", pattern != self.pattern),
                ("prefix", prefix != self.prefix),
                ("sequence_reset", sequence_reset != self.sequence_reset),
            ];
            if let Some((field, _)) = changed.into_iter().find(|(_, changed)| *changed) {
                return Err(DomainError::FormatLocked {
                    module: self.module,
                    field,
                });
            }
        }

        // 周期を変えた場合は現在の期間から数え始める
        let current_period = if sequence_reset != self.sequence_reset {
            sequence_reset.period_marker(now.date_naive())
        } else {
            self.current_period.clone()
        };

        Ok(Self {
            pattern,
            prefix,
            sequence_reset,
            current_period,
            burn_on_cancel: patch.burn_on_cancel.unwrap_or(self.burn_on_cancel),
            updated_at: now,
            ..self
        })
    }

    /// 期間が変わっていれば連番を 0 に戻す
    ///
    /// 同じ期間内で何度呼んでも結果は変わらない。
    /// 戻り値の `bool` はリセットが発生したかどうか。
    pub fn apply_period_reset(self, now: DateTime<Utc>) -> (Self, bool) {
        let marker = self.sequence_reset.period_marker(now.date_naive());
        if marker == self.current_period {
            return (self, false);
        }

        (
            Self {
                current_sequence: 0,
                current_period: marker,
                updated_at: now,
                ..self
            },
            true,
        )
    }

    /// 書式をロックする（冪等）
    pub fn lock(self, now: DateTime<Utc>) -> Self {
        if self.locked {
            return self;
        }
        Self {
            locked: true,
            updated_at: now,
            ..self
        }
    }

    /// 連番を最後に消費した値まで進める
    ///
    /// 現在値より小さい値は拒否する（単調増加）。
    pub fn advanced_to(self, last_sequence: i64, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if last_sequence < self.current_sequence {
            return Err(DomainError::Validation(format!(
                "{} の連番を {} から {} に戻すことはできません",
                self.module, self.current_sequence, last_sequence
            )));
        }
        Ok(Self {
            current_sequence: last_sequence,
            updated_at: now,
            ..self
        })
    }
}
