//! # スキャン判定
//!
//! スキャナーから読み取った文字列を正規化し、プレフィックスからモジュールを判定して、
//! コードレコードの状態に応じた利用可否を返す。
//!
//! | 状態 | valid | reserved | warning | 判定 |
//! |------|-------|----------|---------|------|
//! | プレフィックス不明 | false | false | false | [`ScanVerdict::NotRecognized`] |
//! | レコードなし | true | false | true | [`ScanVerdict::Unregistered`] |
//! | reserved | true | true | false | [`ScanVerdict::Ready`] |
//! | cancelled | true | true | true | [`ScanVerdict::WillReactivate`] |
//! | used | false | true | false | [`ScanVerdict::AlreadyUsed`] |
//! | burned | false | true | false | [`ScanVerdict::Burned`] |

use std::collections::BTreeMap;

use serde::Serialize;
use strum::IntoEnumIterator;

use super::{BarcodeModule, CodeRecord, CodeStatus, LotId, PREFIX_LENGTH, validate_prefix};
use crate::{DomainError, value_objects::EntityId};

/// プレフィックスとモジュールの対応表
///
/// 1 つのモジュールに複数のプレフィックス（旧ラベルの別名を含む）を登録できるが、
/// 1 つのプレフィックスは必ず 1 つのモジュールを指す。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    entries: BTreeMap<String, BarcodeModule>,
}

impl PrefixTable {
    /// 既定プレフィックスと旧プレフィックスを登録した表
    pub fn standard() -> Self {
        let entries = BarcodeModule::iter()
            .flat_map(|module| {
                std::iter::once(module.default_prefix())
                    .chain(module.legacy_prefixes().iter().copied())
                    .map(move |prefix| (prefix.to_string(), module))
            })
            .collect();
        Self { entries }
    }

    /// プレフィックスを登録する
    ///
    /// 別のモジュールに登録済みのプレフィックスは拒否する。
    pub fn register(&mut self, prefix: &str, module: BarcodeModule) -> Result<(), DomainError> {
        let prefix = validate_prefix(prefix)?;
        match self.entries.get(&prefix) {
            Some(existing) if *existing != module => Err(DomainError::Validation(format!(
                "プレフィックス {prefix} は既に {existing} に割り当てられています"
            ))),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(prefix, module);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, prefix: &str) -> Option<BarcodeModule> {
        self.entries.get(prefix).copied()
    }

    /// 正規化済みコードの先頭からモジュールを判定する
    pub fn identify(&self, code: &str) -> Option<BarcodeModule> {
        code.get(..PREFIX_LENGTH).and_then(|prefix| self.lookup(prefix))
    }

    /// モジュールに登録されたプレフィックス一覧
    pub fn prefixes_of(&self, module: BarcodeModule) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, m)| **m == module)
            .map(|(prefix, _)| prefix.as_str())
            .collect()
    }
}

/// スキャン判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanVerdict {
    /// どのモジュールのプレフィックスでもない
    NotRecognized,
    /// モジュールは判定できたが未登録のコード
    Unregistered,
    /// 予約済みで割り当て可能
    Ready,
    /// 取消済み（使用時に復元される）
    WillReactivate,
    /// 使用済み
    AlreadyUsed,
    /// 焼却済み
    Burned,
}

/// スキャン結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub code: String,
    pub module: Option<BarcodeModule>,
    pub verdict: ScanVerdict,
    pub status: Option<CodeStatus>,
    pub entity_id: Option<EntityId>,
    pub lot_id: Option<LotId>,
    pub valid: bool,
    pub reserved: bool,
    pub warning: bool,
    pub message: String,
}

impl ScanResult {
    pub fn not_recognized(code: String) -> Self {
        Self {
            message: format!("コード {code} のプレフィックスはどのモジュールにも該当しません"),
            code,
            module: None,
            verdict: ScanVerdict::NotRecognized,
            status: None,
            entity_id: None,
            lot_id: None,
            valid: false,
            reserved: false,
            warning: false,
        }
    }
}

/// スキャン入力の判定器
#[derive(Debug, Clone)]
pub struct ScanResolver {
    table: PrefixTable,
}

impl ScanResolver {
    pub fn new(table: PrefixTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PrefixTable {
        &self.table
    }

    /// 前後の空白を除き大文字にする
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_ascii_uppercase()
    }

    pub fn identify(&self, normalized: &str) -> Option<BarcodeModule> {
        self.table.identify(normalized)
    }

    /// 判定済みモジュールとレコードから結果を組み立てる
    pub fn evaluate(
        &self,
        code: String,
        module: BarcodeModule,
        record: Option<&CodeRecord>,
    ) -> ScanResult {
        let Some(record) = record else {
            return ScanResult {
                message: format!("{module} のコードですが未登録です（割り当て時に新規登録されます）"),
                code,
                module: Some(module),
                verdict: ScanVerdict::Unregistered,
                status: None,
                entity_id: None,
                lot_id: None,
                valid: true,
                reserved: false,
                warning: true,
            };
        };

        let (verdict, valid, warning, message) = match record.status() {
            CodeStatus::Reserved => (
                ScanVerdict::Ready,
                true,
                false,
                "予約済みのコードです（割り当て可能）".to_string(),
            ),
            CodeStatus::Cancelled => (
                ScanVerdict::WillReactivate,
                true,
                true,
                "取り消されたコードです（使用時に復元されます）".to_string(),
            ),
            CodeStatus::Used => (
                ScanVerdict::AlreadyUsed,
                false,
                false,
                match record.entity_id() {
                    Some(entity_id) => format!("既に使用されています（割り当て先: {entity_id}）"),
                    None => "既に使用されています".to_string(),
                },
            ),
            CodeStatus::Burned => (
                ScanVerdict::Burned,
                false,
                false,
                "焼却済みのコードです（再利用できません）".to_string(),
            ),
        };

        ScanResult {
            code,
            module: Some(module),
            verdict,
            status: Some(record.status()),
            entity_id: record.entity_id(),
            lot_id: record.lot_id().cloned(),
            valid,
            reserved: true,
            warning,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::barcode::{CodeRecordId, NewReservedCode};

    fn resolver() -> ScanResolver {
        ScanResolver::new(PrefixTable::standard())
    }

    fn record(status: CodeStatus) -> CodeRecord {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap();
        let reserved = CodeRecord::reserved(NewReservedCode {
            id: CodeRecordId::new(),
            module: BarcodeModule::Game,
            code: "JEU00000001".to_string(),
            sequence: 1,
            lot_id: LotId::new(),
            now,
        });
        match status {
            CodeStatus::Reserved => reserved,
            CodeStatus::Used => reserved.assigned(EntityId::new(5).unwrap(), now).unwrap(),
            CodeStatus::Cancelled => reserved.cancelled(false, now).unwrap(),
            CodeStatus::Burned => reserved.cancelled(true, now).unwrap(),
        }
    }

    #[rstest]
    #[case("JEU00000001", Some(BarcodeModule::Game))]
    #[case("USA00000007", Some(BarcodeModule::Member))]
    #[case("ADH00000007", Some(BarcodeModule::Member))]
    #[case("DVD00000001", Some(BarcodeModule::Film))]
    #[case("CDA00000001", Some(BarcodeModule::Disc))]
    #[case("XYZ00000001", None)]
    #[case("JE", None)]
    fn test_プレフィックスからモジュールを判定する(
        #[case] code: &str,
        #[case] expected: Option<BarcodeModule>,
    ) {
        assert_eq!(resolver().identify(code), expected);
    }

    #[test]
    fn test_入力は空白除去と大文字化で正規化される() {
        assert_eq!(ScanResolver::normalize("  jeu00000001\n"), "JEU00000001");
    }

    #[test]
    fn test_別モジュールのプレフィックスは登録できない() {
        let mut table = PrefixTable::standard();

        assert!(table.register("GAM", BarcodeModule::Game).is_ok());
        assert!(table.register("jeu", BarcodeModule::Game).is_ok());
        assert!(matches!(
            table.register("JEU", BarcodeModule::Book),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(table.prefixes_of(BarcodeModule::Game), ["GAM", "JEU"]);
    }

    #[test]
    fn test_未登録コードは有効だが警告付き() {
        let result = resolver().evaluate("USA00000007".to_string(), BarcodeModule::Member, None);

        assert_eq!(result.verdict, ScanVerdict::Unregistered);
        assert_eq!(result.module, Some(BarcodeModule::Member));
        assert!(result.valid);
        assert!(!result.reserved);
        assert!(result.warning);
    }

    #[rstest]
    #[case(CodeStatus::Reserved, ScanVerdict::Ready, true, false)]
    #[case(CodeStatus::Cancelled, ScanVerdict::WillReactivate, true, true)]
    #[case(CodeStatus::Used, ScanVerdict::AlreadyUsed, false, false)]
    #[case(CodeStatus::Burned, ScanVerdict::Burned, false, false)]
    fn test_レコードの状態に応じて判定する(
        #[case] status: CodeStatus,
        #[case] verdict: ScanVerdict,
        #[case] valid: bool,
        #[case] warning: bool,
    ) {
        let record = record(status);

        let result = resolver().evaluate(
            record.code().to_string(),
            BarcodeModule::Game,
            Some(&record),
        );

        assert_eq!(result.verdict, verdict);
        assert_eq!(result.status, Some(status));
        assert_eq!(result.valid, valid);
        assert_eq!(result.warning, warning);
        assert!(result.reserved);
        assert_eq!(result.lot_id.as_ref(), record.lot_id());
    }

    #[test]
    fn test_使用済みコードは割り当て先を返す() {
        let record = record(CodeStatus::Used);

        let result = resolver().evaluate("JEU00000001".to_string(), BarcodeModule::Game, Some(&record));

        assert_eq!(result.entity_id, Some(EntityId::new(5).unwrap()));
        assert!(!result.valid);
    }

    #[test]
    fn test_認識できないコード() {
        let result = ScanResult::not_recognized("XYZ1".to_string());

        assert_eq!(result.verdict, ScanVerdict::NotRecognized);
        assert!(!result.valid);
        assert_eq!(result.module, None);
    }
}
