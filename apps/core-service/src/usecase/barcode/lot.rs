//! ロットの一覧・詳細・取消・印刷記録

use itertools::Itertools;
use ludo_domain::{
    DomainError,
    barcode::{CodeRecord, CodeStatus, Lot, LotId},
};
use ludo_infra::repository::LotQuery;
use ludo_shared::{
    event_log::{error, event},
    log_business_event,
};

use super::{
    BarcodeUseCaseImpl,
    ListLotsInput,
    LotCancellation,
    LotDetail,
    LotStats,
    clamp_limit,
    lot_not_found,
};
use crate::{error::CoreError, usecase::helpers::FindResultExt};

impl BarcodeUseCaseImpl {
    /// ロット一覧を新しい順に取得する
    pub async fn list_lots(&self, input: ListLotsInput) -> Result<Vec<Lot>, CoreError> {
        let query = LotQuery {
            module: input.module,
            status: input.status,
            limit:  clamp_limit(input.limit),
        };
        Ok(self.lot_repo.list(&query).await?)
    }

    /// ロットとそのコード、集計を取得する
    ///
    /// 保存されているカウンターとコードの実際の状態が食い違う場合は
    /// 補正せずに `LotCounterMismatch` を返す。
    pub async fn get_lot_detail(&self, lot_id: LotId) -> Result<LotDetail, CoreError> {
        let lot = self
            .lot_repo
            .find_by_id(&lot_id)
            .await
            .or_not_found(lot_not_found(&lot_id))?;
        let codes = self.code_repo(lot.module()).find_by_lot(&lot_id).await?;

        let stats = tally(&lot, &codes);
        if stats.used != lot.used_count()
            || stats.cancelled + stats.burned != lot.cancelled_count()
            || codes.len() != lot.quantity() as usize
        {
            tracing::error!(
                error.category = error::category::BUSINESS_RULE,
                error.kind = error::kind::COUNTER_MISMATCH,
                lot_id = %lot_id,
                stored.used = lot.used_count(),
                stored.cancelled = lot.cancelled_count(),
                actual.used = stats.used,
                actual.cancelled = stats.cancelled + stats.burned,
                actual.codes = codes.len(),
                "ロットのカウンターがコードの状態と一致しません"
            );
            return Err(DomainError::LotCounterMismatch {
                lot_id: lot_id.to_string(),
                detail: format!(
                    "保存値 使用 {} / 取消 {}、実際 使用 {} / 取消 {} / コード {} 件",
                    lot.used_count(),
                    lot.cancelled_count(),
                    stats.used,
                    stats.cancelled + stats.burned,
                    codes.len()
                ),
            }
            .into());
        }

        Ok(LotDetail { lot, codes, stats })
    }

    /// ロットを取り消す
    ///
    /// ## 処理フロー
    ///
    /// 1. ロットのコンテキストから取消方針（焼却するか）を決める
    /// 2. ロット行をロックし、有効であることを確認
    /// 3. 予約済みのコードをまとめて取消（焼却）に遷移
    /// 4. ロットの取消数を加算して取消状態にする
    /// 5. コミット
    ///
    /// 使用済みのコードと、既に取り消されたコードには触れない。
    pub async fn cancel_lot(&self, lot_id: LotId) -> Result<LotCancellation, CoreError> {
        // 1. 取消方針
        let lot = self
            .lot_repo
            .find_by_id(&lot_id)
            .await
            .or_not_found(lot_not_found(&lot_id))?;
        lot.ensure_active()?;
        let burn = self.burn_policy(lot.module(), &lot.context()).await?;

        let now = self.clock.now();
        let mut tx = self.tx_manager.begin().await?;

        // 2. ロット行をロック
        let lot = self
            .lot_repo
            .find_for_update(&mut tx, &lot_id)
            .await
            .or_not_found(lot_not_found(&lot_id))?;
        lot.ensure_active()?;

        // 3. 予約済みコードを遷移
        let transitioned = self
            .code_repo(lot.module())
            .cancel_reserved_in_lot(&mut tx, &lot_id, burn, now)
            .await?;

        // 4. ロットを取消
        let lot = lot.cancelled(transitioned, now)?;
        self.lot_repo.update(&mut tx, &lot).await?;

        // 5. コミット
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = event::action::LOT_CANCELLED,
            event.entity_type = event::entity_type::LOT,
            event.entity_id = %lot_id,
            event.module = %lot.module(),
            event.result = event::result::SUCCESS,
            barcode.transitioned = transitioned,
            barcode.burned = burn,
            "ロットを取消"
        );

        Ok(LotCancellation {
            lot,
            transitioned,
            burned: burn,
        })
    }

    /// 印刷を記録する
    ///
    /// 初回は印刷日時を記録し、2 回目以降は再印刷回数を加算する。
    /// 取り消されたロットは印刷できない。
    pub async fn mark_lot_printed(&self, lot_id: LotId) -> Result<Lot, CoreError> {
        let now = self.clock.now();
        let mut tx = self.tx_manager.begin().await?;

        let lot = self
            .lot_repo
            .find_for_update(&mut tx, &lot_id)
            .await
            .or_not_found(lot_not_found(&lot_id))?;
        lot.ensure_active()?;

        let lot = lot.printed(now);
        self.lot_repo.update(&mut tx, &lot).await?;
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = event::action::LOT_PRINTED,
            event.entity_type = event::entity_type::LOT,
            event.entity_id = %lot_id,
            event.module = %lot.module(),
            event.result = event::result::SUCCESS,
            barcode.reprint_count = lot.reprint_count(),
            "ロットの印刷を記録"
        );

        Ok(lot)
    }
}

/// コードの状態を集計する
fn tally(lot: &Lot, codes: &[CodeRecord]) -> LotStats {
    let counts = codes.iter().counts_by(CodeRecord::status);
    let count = |status: CodeStatus| counts.get(&status).copied().unwrap_or(0) as u32;

    LotStats {
        reserved:  count(CodeStatus::Reserved),
        used:      count(CodeStatus::Used),
        cancelled: count(CodeStatus::Cancelled),
        burned:    count(CodeStatus::Burned),
        remaining: lot.remaining(),
        complete:  lot.is_complete(),
    }
}
