//! # テスト用モックリポジトリ
//!
//! ユースケーステストで使用するインメモリモックリポジトリ。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! ludo-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! ロールバックはしない。ロット予約の原子性とプレフィックス取得の直列化は
//! `apps/core-service/tests/barcode_usecase_test.rs` で PostgreSQL に対して確認する。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ludo_domain::barcode::{
    BarcodeContext,
    BarcodeModule,
    CodeRecord,
    CodeRecordId,
    CodeRef,
    CodeStatus,
    FormatConfig,
    Lot,
    LotId,
};

use crate::{
    db::{TransactionManager, TxContext},
    error::InfraError,
    repository::{
        CodeRecordRepository,
        CodeRepositoryRegistry,
        FormatConfigRepository,
        LotQuery,
        LotRepository,
    },
};

// ===== MockFormatConfigRepository =====

#[derive(Clone, Default)]
pub struct MockFormatConfigRepository {
    configs: Arc<Mutex<Vec<FormatConfig>>>,
}

impl MockFormatConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_config(&self, config: FormatConfig) {
        self.configs.lock().unwrap().push(config);
    }

    pub fn all(&self) -> Vec<FormatConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait]
impl FormatConfigRepository for MockFormatConfigRepository {
    async fn find(
        &self,
        module: BarcodeModule,
        context: &BarcodeContext,
    ) -> Result<Option<FormatConfig>, InfraError> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.module() == module && c.context() == *context)
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<FormatConfig>, InfraError> {
        Ok(self.all())
    }

    async fn lock_or_create(
        &self,
        _tx: &mut TxContext,
        initial: &FormatConfig,
    ) -> Result<FormatConfig, InfraError> {
        let mut configs = self.configs.lock().unwrap();
        if let Some(existing) = configs
            .iter()
            .find(|c| c.module() == initial.module() && c.context() == initial.context())
        {
            return Ok(existing.clone());
        }
        configs.push(initial.clone());
        Ok(initial.clone())
    }

    async fn update(&self, _tx: &mut TxContext, config: &FormatConfig) -> Result<(), InfraError> {
        let mut configs = self.configs.lock().unwrap();
        let Some(pos) = configs.iter().position(|c| c.id() == config.id()) else {
            return Err(InfraError::conflict("FormatConfig", config.id().to_string()));
        };
        configs[pos] = config.clone();
        Ok(())
    }

    async fn lock_prefix_claims(&self, _tx: &mut TxContext) -> Result<(), InfraError> {
        Ok(())
    }

    async fn find_by_prefix(
        &self,
        _tx: &mut TxContext,
        prefix: &str,
    ) -> Result<Vec<FormatConfig>, InfraError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|c| c.prefix() == prefix)
            .collect())
    }
}

// ===== MockLotRepository =====

#[derive(Clone, Default)]
pub struct MockLotRepository {
    lots:            Arc<Mutex<Vec<Lot>>>,
    failing_inserts: Arc<Mutex<u32>>,
}

impl MockLotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の `count` 回の insert を競合エラーで失敗させる
    pub fn fail_next_inserts(&self, count: u32) {
        *self.failing_inserts.lock().unwrap() = count;
    }

    pub fn all(&self) -> Vec<Lot> {
        self.lots.lock().unwrap().clone()
    }
}

#[async_trait]
impl LotRepository for MockLotRepository {
    async fn insert(&self, _tx: &mut TxContext, lot: &Lot) -> Result<(), InfraError> {
        {
            let mut failing = self.failing_inserts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(InfraError::conflict("Lot", lot.id().to_string()));
            }
        }
        self.lots.lock().unwrap().push(lot.clone());
        Ok(())
    }

    async fn update(&self, _tx: &mut TxContext, lot: &Lot) -> Result<(), InfraError> {
        let mut lots = self.lots.lock().unwrap();
        let Some(pos) = lots.iter().position(|l| l.id() == lot.id()) else {
            return Err(InfraError::conflict("Lot", lot.id().to_string()));
        };
        lots[pos] = lot.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &LotId) -> Result<Option<Lot>, InfraError> {
        Ok(self
            .lots
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id() == id)
            .cloned())
    }

    async fn find_for_update(
        &self,
        _tx: &mut TxContext,
        id: &LotId,
    ) -> Result<Option<Lot>, InfraError> {
        self.find_by_id(id).await
    }

    async fn list(&self, query: &LotQuery) -> Result<Vec<Lot>, InfraError> {
        let mut lots: Vec<Lot> = self
            .lots
            .lock()
            .unwrap()
            .iter()
            .filter(|l| query.module.is_none_or(|m| l.module() == m))
            .filter(|l| query.status.is_none_or(|s| l.status() == s))
            .cloned()
            .collect();
        lots.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        lots.truncate(usize::try_from(query.limit).unwrap_or(0));
        Ok(lots)
    }
}

// ===== MockCodeRecordRepository =====

#[derive(Clone)]
pub struct MockCodeRecordRepository {
    module:  BarcodeModule,
    records: Arc<Mutex<Vec<CodeRecord>>>,
}

impl MockCodeRecordRepository {
    pub fn new(module: BarcodeModule) -> Self {
        Self {
            module,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 全モジュール分のモックを登録したレジストリ
    pub fn registry() -> CodeRepositoryRegistry {
        CodeRepositoryRegistry::new(|module| Arc::new(Self::new(module)))
    }

    fn sorted(mut records: Vec<CodeRecord>) -> Vec<CodeRecord> {
        // PostgreSQL の昇順と同じく連番なしを末尾に置く
        records.sort_by(|a, b| {
            (a.sequence().is_none(), a.sequence())
                .cmp(&(b.sequence().is_none(), b.sequence()))
                .then_with(|| a.code().cmp(b.code()))
        });
        records
    }
}

#[async_trait]
impl CodeRecordRepository for MockCodeRecordRepository {
    fn module(&self) -> BarcodeModule {
        self.module
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<CodeRecord>, InfraError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.code() == code)
            .cloned())
    }

    async fn find_by_id(&self, id: &CodeRecordId) -> Result<Option<CodeRecord>, InfraError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id() == id)
            .cloned())
    }

    async fn find_for_update(
        &self,
        _tx: &mut TxContext,
        code: &CodeRef,
    ) -> Result<Option<CodeRecord>, InfraError> {
        match code {
            CodeRef::Code(code) => self.find_by_code(code).await,
            CodeRef::Id(id) => self.find_by_id(id).await,
        }
    }

    async fn find_existing_codes(
        &self,
        _tx: &mut TxContext,
        codes: &[String],
    ) -> Result<Vec<String>, InfraError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| codes.iter().any(|c| c == r.code()))
            .map(|r| r.code().to_string())
            .collect())
    }

    async fn insert(&self, tx: &mut TxContext, record: &CodeRecord) -> Result<(), InfraError> {
        self.insert_many(tx, std::slice::from_ref(record)).await
    }

    async fn insert_many(
        &self,
        _tx: &mut TxContext,
        records: &[CodeRecord],
    ) -> Result<(), InfraError> {
        let mut stored = self.records.lock().unwrap();
        // UNIQUE (code) と同じ振る舞い
        if let Some(duplicate) = records
            .iter()
            .find(|r| stored.iter().any(|s| s.code() == r.code()))
        {
            return Err(InfraError::conflict("CodeRecord", duplicate.code()));
        }
        stored.extend(records.iter().cloned());
        Ok(())
    }

    async fn update(
        &self,
        _tx: &mut TxContext,
        record: &CodeRecord,
        expected: CodeStatus,
    ) -> Result<(), InfraError> {
        let mut records = self.records.lock().unwrap();
        let Some(pos) = records
            .iter()
            .position(|r| r.id() == record.id() && r.status() == expected)
        else {
            return Err(InfraError::conflict("CodeRecord", record.code()));
        };
        records[pos] = record.clone();
        Ok(())
    }

    async fn cancel_reserved_in_lot(
        &self,
        _tx: &mut TxContext,
        lot_id: &LotId,
        burn: bool,
        now: DateTime<Utc>,
    ) -> Result<u32, InfraError> {
        let mut records = self.records.lock().unwrap();
        let mut count = 0;
        for record in records.iter_mut() {
            if record.lot_id() == Some(lot_id) && record.status() == CodeStatus::Reserved {
                *record = record
                    .clone()
                    .cancelled(burn, now)
                    .map_err(|e| InfraError::unexpected(e.to_string()))?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find_by_lot(&self, lot_id: &LotId) -> Result<Vec<CodeRecord>, InfraError> {
        let records = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.lot_id() == Some(lot_id))
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }

    async fn list_available(
        &self,
        lot_id: Option<&LotId>,
        limit: i64,
    ) -> Result<Vec<CodeRecord>, InfraError> {
        let records = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status() == CodeStatus::Reserved)
            .filter(|r| lot_id.is_none_or(|id| r.lot_id() == Some(id)))
            .cloned()
            .collect();
        let mut records = Self::sorted(records);
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }
}

// ===== MockTransactionManager =====

/// テスト用の TransactionManager
///
/// `TxContext::mock()` を返す。
pub struct MockTransactionManager;

#[async_trait]
impl TransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        Ok(TxContext::mock())
    }
}
