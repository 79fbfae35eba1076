//! # バーコードユースケース
//!
//! 書式設定・ロット予約・コードのライフサイクル・スキャン判定を束ねるサービス。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリ・トランザクション・時刻を `Arc<dyn Trait>` で受け取る
//! - **ロック順序**: 書式設定 → ロット → コードの順に行ロックを取り、
//!   予約・割り当て・取消が互いにデッドロックしないようにする
//! - **カウンターは明示的に更新**: コードの遷移とロットのカウンター更新を
//!   同じトランザクション内でこの層が行う
//!
//! ## モジュール構成
//!
//! - `format`: 書式設定の取得・更新、次コードのプレビュー
//! - `reserve`: ロット予約（リトライ付き）
//! - `lot`: ロットの一覧・詳細・取消・印刷記録
//! - `lifecycle`: コードの割り当て・取消・復元
//! - `query`: 割り当て可能コードの一覧、スキャン判定

mod format;
mod lifecycle;
mod lot;
mod query;
mod reserve;

use std::{collections::HashSet, sync::Arc};

use ludo_domain::{
    DomainError,
    barcode::{
        Allocation,
        BarcodeContext,
        BarcodeModule,
        CodeRecord,
        DEFAULT_COLLISION_BUDGET,
        FormatConfig,
        Lot,
        LotStatus,
        PrefixTable,
        SequenceAllocator,
    },
    clock::Clock,
    value_objects::{ActorId, EntityId},
};
use ludo_infra::{
    db::{TransactionManager, TxContext},
    repository::{CodeRecordRepository, CodeRepositoryRegistry, FormatConfigRepository, LotRepository},
};
use serde::Serialize;

use crate::{config::ServiceConfig, error::CoreError};

/// 一覧取得の既定件数
pub const DEFAULT_LIST_LIMIT: i64 = 100;
/// 一覧取得の上限件数
pub const MAX_LIST_LIMIT: i64 = 1000;

/// ロット予約の動作設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationSettings {
    /// リトライ可能なエラー時の最大試行回数（1 以上）
    pub max_attempts:     u32,
    /// 1 回の予約でスキップできる衝突数の上限
    pub collision_budget: usize,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            max_attempts:     3,
            collision_budget: DEFAULT_COLLISION_BUDGET,
        }
    }
}

impl From<&ServiceConfig> for ReservationSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_attempts:     config.reserve_max_attempts.max(1),
            collision_budget: config.collision_budget,
        }
    }
}

// ===== 入力 =====

/// ロット予約入力
#[derive(Debug, Clone)]
pub struct ReserveLotInput {
    pub module:   BarcodeModule,
    /// 予約数（1〜1000、範囲外は `InvalidQuantity`）
    pub quantity: i64,
    pub context:  BarcodeContext,
    pub actor_id: Option<ActorId>,
}

/// コード割り当て入力
#[derive(Debug, Clone)]
pub struct AssignCodeInput {
    pub module:    BarcodeModule,
    /// 未指定の場合はグローバル書式のフォールバックコードを使う
    pub code:      Option<String>,
    pub entity_id: EntityId,
}

/// ロット一覧の絞り込み条件
#[derive(Debug, Clone, Default)]
pub struct ListLotsInput {
    pub module: Option<BarcodeModule>,
    pub status: Option<LotStatus>,
    pub limit:  Option<i64>,
}

// ===== 出力 =====

/// 次に発行されるコードのプレビュー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodePreview {
    pub module:   BarcodeModule,
    pub context:  BarcodeContext,
    pub code:     String,
    pub sequence: i64,
    /// 書式がロック済みか（pattern / prefix / reset を変更できるか）
    pub locked:   bool,
}

/// ロット予約の結果
#[derive(Debug, Clone, Serialize)]
pub struct ReservedLot {
    pub lot:     Lot,
    pub codes:   Vec<CodeRecord>,
    /// 既存コードとの衝突でスキップした連番数
    pub skipped: usize,
}

/// ロット内コードの集計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LotStats {
    pub reserved:  u32,
    pub used:      u32,
    pub cancelled: u32,
    pub burned:    u32,
    pub remaining: u32,
    pub complete:  bool,
}

/// ロット詳細
#[derive(Debug, Clone, Serialize)]
pub struct LotDetail {
    pub lot:   Lot,
    pub codes: Vec<CodeRecord>,
    pub stats: LotStats,
}

/// ロット取消の結果
#[derive(Debug, Clone, Serialize)]
pub struct LotCancellation {
    pub lot:          Lot,
    /// 予約済みから取消（焼却）に遷移したコード数
    pub transitioned: u32,
    pub burned:       bool,
}

/// コード割り当ての結果
#[derive(Debug, Clone, Serialize)]
pub struct AssignedCode {
    pub record:  CodeRecord,
    /// ロット経由の割り当てであれば更新後のロット
    pub lot:     Option<Lot>,
    /// 予約なしで新規登録したか
    pub ad_hoc:  bool,
}

/// バーコードユースケース実装
pub struct BarcodeUseCaseImpl {
    format_repo: Arc<dyn FormatConfigRepository>,
    lot_repo:    Arc<dyn LotRepository>,
    code_repos:  CodeRepositoryRegistry,
    tx_manager:  Arc<dyn TransactionManager>,
    clock:       Arc<dyn Clock>,
    settings:    ReservationSettings,
}

impl BarcodeUseCaseImpl {
    pub fn new(
        format_repo: Arc<dyn FormatConfigRepository>,
        lot_repo: Arc<dyn LotRepository>,
        code_repos: CodeRepositoryRegistry,
        tx_manager: Arc<dyn TransactionManager>,
        clock: Arc<dyn Clock>,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            format_repo,
            lot_repo,
            code_repos,
            tx_manager,
            clock,
            settings,
        }
    }

    fn code_repo(&self, module: BarcodeModule) -> &dyn CodeRecordRepository {
        self.code_repos.get(module).as_ref()
    }

    /// 空き連番を `quantity` 件集める
    ///
    /// 候補をウィンドウ単位でまとめてテーブルに問い合わせる。
    /// ステータスを問わず既存のコードはすべて使用済みとして扱う。
    async fn allocate(
        &self,
        tx: &mut TxContext,
        allocator: &SequenceAllocator,
        code_repo: &dyn CodeRecordRepository,
        quantity: usize,
    ) -> Result<Allocation, CoreError> {
        let mut probe = allocator.probe(quantity);
        while !probe.is_complete() {
            let window = probe.window();
            let codes: Vec<String> = window.iter().map(|c| c.code.clone()).collect();
            let taken: HashSet<String> = code_repo
                .find_existing_codes(tx, &codes)
                .await?
                .into_iter()
                .collect();
            probe.absorb(window, |code| taken.contains(code))?;
        }
        Ok(probe.finish()?)
    }

    /// 既定プレフィックスに、保存済み書式のプレフィックスを加えた対応表
    ///
    /// 他モジュールと重複する設定は登録せずに警告ログを出す。
    async fn prefix_table(&self) -> Result<PrefixTable, CoreError> {
        let mut table = PrefixTable::standard();
        for config in self.format_repo.find_all().await? {
            if let Err(e) = table.register(config.prefix(), config.module()) {
                tracing::warn!(
                    barcode.module = %config.module(),
                    barcode.prefix = config.prefix(),
                    error = %e,
                    "書式のプレフィックスを対応表に登録できません"
                );
            }
        }
        Ok(table)
    }

    /// コンテキストの取消方針（焼却するか）
    ///
    /// 書式設定が未作成なら既定（焼却しない）。
    async fn burn_policy(
        &self,
        module: BarcodeModule,
        context: &BarcodeContext,
    ) -> Result<bool, CoreError> {
        Ok(self
            .format_repo
            .find(module, context)
            .await?
            .as_ref()
            .is_some_and(FormatConfig::burn_on_cancel))
    }
}

/// 一覧件数を既定値と上限で丸める
fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// 同じトランザクションでロットを読み直し、事前読み取りと一致するか確認する
fn ensure_same_lot(
    record: &CodeRecord,
    expected: Option<&Lot>,
) -> Result<(), CoreError> {
    if record.lot_id() != expected.map(Lot::id) {
        return Err(ludo_infra::InfraError::conflict("CodeRecord", record.code()).into());
    }
    Ok(())
}

fn not_found(module: BarcodeModule, code: impl ToString) -> impl FnOnce() -> DomainError {
    move || DomainError::CodeNotFound {
        module,
        code: code.to_string(),
    }
}

fn lot_not_found(lot_id: impl ToString) -> impl FnOnce() -> DomainError {
    move || DomainError::LotNotFound {
        lot_id: lot_id.to_string(),
    }
}

#[cfg(test)]
pub(super) mod test_helpers {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use ludo_domain::{
        barcode::{BarcodeContext, BarcodeModule, CodeRecord, CodeRef},
        clock::FixedClock,
    };
    use ludo_infra::{
        db::TxContext,
        mock::{
            MockCodeRecordRepository,
            MockFormatConfigRepository,
            MockLotRepository,
            MockTransactionManager,
        },
        repository::CodeRepositoryRegistry,
    };

    use super::{BarcodeUseCaseImpl, ReservationSettings, ReserveLotInput, ReservedLot};

    /// テスト用の共有ストア
    ///
    /// モックは内部で状態を共有するため、時刻を変えて SUT を作り直しても
    /// 同じデータが見える。
    #[derive(Clone)]
    pub struct Stores {
        pub formats: MockFormatConfigRepository,
        pub lots:    MockLotRepository,
        pub codes:   CodeRepositoryRegistry,
    }

    impl Stores {
        pub fn new() -> Self {
            Self {
                formats: MockFormatConfigRepository::new(),
                lots:    MockLotRepository::new(),
                codes:   MockCodeRecordRepository::registry(),
            }
        }

        pub fn sut_at(&self, now: DateTime<Utc>) -> BarcodeUseCaseImpl {
            self.sut_with(now, ReservationSettings::default())
        }

        pub fn sut_with(&self, now: DateTime<Utc>, settings: ReservationSettings) -> BarcodeUseCaseImpl {
            BarcodeUseCaseImpl::new(
                Arc::new(self.formats.clone()),
                Arc::new(self.lots.clone()),
                self.codes.clone(),
                Arc::new(MockTransactionManager),
                Arc::new(FixedClock::new(now)),
                settings,
            )
        }

        /// コードを直接登録する（旧データや並行処理の再現用）
        pub async fn seed_code(&self, record: CodeRecord) {
            self.codes
                .get(record.module())
                .insert(&mut TxContext::mock(), &record)
                .await
                .unwrap();
        }

        pub async fn code(&self, module: BarcodeModule, code: &str) -> CodeRecord {
            self.codes
                .get(module)
                .find_for_update(&mut TxContext::mock(), &CodeRef::Code(code.to_string()))
                .await
                .unwrap()
                .unwrap_or_else(|| panic!("{code} が存在しない"))
        }
    }

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap()
    }

    pub fn reserve_input(module: BarcodeModule, quantity: i64) -> ReserveLotInput {
        ReserveLotInput {
            module,
            quantity,
            context: BarcodeContext::global(),
            actor_id: None,
        }
    }

    /// ゲームモジュールで 50 件予約済みの状態を作る
    pub async fn setup_game_lot(stores: &Stores) -> ReservedLot {
        stores
            .sut_at(now())
            .reserve_lot(reserve_input(BarcodeModule::Game, 50))
            .await
            .unwrap()
    }
}
