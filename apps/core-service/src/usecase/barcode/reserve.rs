//! ロット予約

use ludo_domain::{
    barcode::{CodeRecord, CodeRecordId, FormatConfig, Lot, LotId, NewLot, NewReservedCode, SequenceAllocator},
    value_objects::LotQuantity,
};
use ludo_shared::{
    event_log::{error, event},
    log_business_event,
};

use super::{BarcodeUseCaseImpl, ReserveLotInput, ReservedLot};
use crate::error::CoreError;

impl BarcodeUseCaseImpl {
    /// 連番を確保してロットを予約する
    ///
    /// 直列化失敗・デッドロック・一意制約違反・更新競合のときは、
    /// 最初の読み取りからトランザクション全体を最大
    /// `settings.max_attempts` 回までやり直す。
    ///
    /// ## エラー
    ///
    /// - `InvalidQuantity`: 予約数が 1〜1000 の範囲外（リトライしない）
    /// - `SequenceExhausted`: 衝突スキップの上限超過
    pub async fn reserve_lot(&self, input: ReserveLotInput) -> Result<ReservedLot, CoreError> {
        let quantity = LotQuantity::new(input.quantity)?;

        let mut attempt = 1;
        loop {
            match self.try_reserve_lot(&input, quantity).await {
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    tracing::warn!(
                        error.category = error::category::INFRASTRUCTURE,
                        error.kind = error::kind::DATABASE,
                        barcode.module = %input.module,
                        attempt,
                        error = %e,
                        "ロット予約が競合したため再試行します"
                    );
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(
                        error.category = error::category::INFRASTRUCTURE,
                        error.kind = error::kind::RETRY_EXHAUSTED,
                        barcode.module = %input.module,
                        attempt,
                        error = %e,
                        "ロット予約の再試行回数を超えました"
                    );
                    return Err(e);
                }
                result => return result,
            }
        }
    }

    /// ロット予約を 1 回試行する
    ///
    /// ## 処理フロー
    ///
    /// 1. 書式設定行をロック（なければ既定値で作成）
    /// 2. 期間が変わっていれば連番を 0 に戻す
    /// 3. 既存コードをスキップしながら空き連番を集める
    /// 4. ロットを作成し、予約済みコードを一括登録
    /// 5. 最終連番を記録して書式をロック
    /// 6. コミット
    ///
    /// どの段階で失敗してもトランザクションは破棄され、何も残らない。
    async fn try_reserve_lot(
        &self,
        input: &ReserveLotInput,
        quantity: LotQuantity,
    ) -> Result<ReservedLot, CoreError> {
        let now = self.clock.now();
        let module = input.module;
        let code_repo = self.code_repo(module);
        let mut tx = self.tx_manager.begin().await?;

        // 1. 書式設定行をロック
        let initial = FormatConfig::with_defaults(module, input.context, now);
        let config = self.format_repo.lock_or_create(&mut tx, &initial).await?;

        // 2. 期間リセット
        let (config, reset) = config.apply_period_reset(now);
        if reset {
            tracing::info!(
                barcode.module = %module,
                barcode.period = config.current_period(),
                "期間が変わったため連番をリセット"
            );
        }

        // 3. 空き連番を確保
        let allocator = SequenceAllocator::new(&config, now.date_naive())
            .with_collision_budget(self.settings.collision_budget);
        let allocation = self
            .allocate(&mut tx, &allocator, code_repo, quantity.as_usize())
            .await?;
        let (Some(first), Some(last)) = (allocation.first(), allocation.last()) else {
            return Err(CoreError::Internal(format!(
                "{module} の連番を 1 件も確保できませんでした"
            )));
        };
        let last_sequence = last.sequence;

        // 4. ロットとコードを登録
        let lot = Lot::new(NewLot {
            id: LotId::new(),
            module,
            context: input.context,
            quantity,
            first_code: first.code.clone(),
            last_code: last.code.clone(),
            created_by: input.actor_id.clone(),
            now,
        });
        self.lot_repo.insert(&mut tx, &lot).await?;

        let codes: Vec<CodeRecord> = allocation
            .codes
            .into_iter()
            .map(|candidate| {
                CodeRecord::reserved(NewReservedCode {
                    id: CodeRecordId::new(),
                    module,
                    code: candidate.code,
                    sequence: candidate.sequence,
                    lot_id: lot.id().clone(),
                    now,
                })
            })
            .collect();
        code_repo.insert_many(&mut tx, &codes).await?;

        // 5. 連番を進めてロック
        let config = config.advanced_to(last_sequence, now)?.lock(now);
        self.format_repo.update(&mut tx, &config).await?;

        // 6. コミット
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = event::action::LOT_RESERVED,
            event.entity_type = event::entity_type::LOT,
            event.entity_id = %lot.id(),
            event.module = %module,
            event.result = event::result::SUCCESS,
            barcode.quantity = lot.quantity(),
            barcode.first_code = lot.first_code(),
            barcode.last_code = lot.last_code(),
            barcode.skipped = allocation.skipped,
            "ロットを予約"
        );

        Ok(ReservedLot {
            lot,
            codes,
            skipped: allocation.skipped,
        })
    }
}
