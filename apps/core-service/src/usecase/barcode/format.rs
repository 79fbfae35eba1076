//! 書式設定の取得・更新と次コードのプレビュー

use ludo_domain::{
    DomainError,
    barcode::{
        BarcodeContext,
        BarcodeModule,
        FormatConfig,
        FormatConfigPatch,
        PrefixTable,
        SequenceAllocator,
        validate_prefix,
    },
};
use ludo_shared::{event_log::event, log_business_event};

use super::{BarcodeUseCaseImpl, CodePreview};
use crate::error::CoreError;

impl BarcodeUseCaseImpl {
    /// 書式設定を取得する（なければ既定値で作成する）
    pub async fn get_config(
        &self,
        module: BarcodeModule,
        context: BarcodeContext,
    ) -> Result<FormatConfig, CoreError> {
        if let Some(config) = self.format_repo.find(module, &context).await? {
            return Ok(config);
        }

        let mut tx = self.tx_manager.begin().await?;
        let initial = FormatConfig::with_defaults(module, context, self.clock.now());
        let config = self.format_repo.lock_or_create(&mut tx, &initial).await?;
        tx.commit().await?;

        tracing::debug!(barcode.module = %module, context = %context, "書式設定を作成");
        Ok(config)
    }

    /// 書式設定を部分更新する
    ///
    /// ## 処理フロー
    ///
    /// 1. プレフィックス変更ならロックを取り、他モジュールのものでないか確認
    /// 2. 書式設定行をロック（なければ既定値で作成）
    /// 3. パッチを適用（ロック済みなら構造的な変更を拒否）
    /// 4. 保存してコミット
    ///
    /// ## エラー
    ///
    /// - `Validation`: パターン・プレフィックスの書式違反、他モジュールのプレフィックス
    /// - `FormatLocked`: ロック済み書式の pattern / prefix / sequence_reset の変更
    pub async fn update_config(
        &self,
        module: BarcodeModule,
        context: BarcodeContext,
        patch: FormatConfigPatch,
    ) -> Result<FormatConfig, CoreError> {
        let now = self.clock.now();
        let mut tx = self.tx_manager.begin().await?;

        // 1. プレフィックスの所有モジュールを確認
        if let Some(prefix) = &patch.prefix {
            let prefix = validate_prefix(prefix)?;
            self.format_repo.lock_prefix_claims(&mut tx).await?;
            let claimed = self.format_repo.find_by_prefix(&mut tx, &prefix).await?;
            let owner = PrefixTable::standard()
                .lookup(&prefix)
                .into_iter()
                .chain(claimed.iter().map(FormatConfig::module))
                .find(|owner| *owner != module);
            if let Some(owner) = owner {
                return Err(DomainError::Validation(format!(
                    "プレフィックス {prefix} は {owner} で使用されています"
                ))
                .into());
            }
        }

        // 2. 行ロック
        let initial = FormatConfig::with_defaults(module, context, now);
        let config = self.format_repo.lock_or_create(&mut tx, &initial).await?;

        // 3. パッチ適用
        let updated = config.apply_patch(patch, now)?;

        // 4. 保存
        self.format_repo.update(&mut tx, &updated).await?;
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = event::action::FORMAT_UPDATED,
            event.entity_type = event::entity_type::FORMAT_CONFIG,
            event.entity_id = %updated.id(),
            event.module = %module,
            event.result = event::result::SUCCESS,
            barcode.pattern = updated.pattern(),
            barcode.prefix = updated.prefix(),
            barcode.sequence_reset = %updated.sequence_reset(),
            barcode.locked = updated.is_locked(),
            "書式設定を更新"
        );

        Ok(updated)
    }

    /// 次に予約されるコードを確認する（何も消費しない）
    ///
    /// 期間リセットと既存コードとの衝突スキップを反映した結果を返す。
    /// 書式設定の行はロックしないため、並行する予約があれば実際の値はずれうる。
    pub async fn preview_next_code(
        &self,
        module: BarcodeModule,
        context: BarcodeContext,
    ) -> Result<CodePreview, CoreError> {
        let now = self.clock.now();
        let config = self
            .format_repo
            .find(module, &context)
            .await?
            .unwrap_or_else(|| FormatConfig::with_defaults(module, context, now));
        let (config, _) = config.apply_period_reset(now);

        let allocator = SequenceAllocator::new(&config, now.date_naive())
            .with_collision_budget(self.settings.collision_budget);

        // 読み取りのみ。コミットせずに破棄する
        let mut tx = self.tx_manager.begin().await?;
        let allocation = self
            .allocate(&mut tx, &allocator, self.code_repo(module), 1)
            .await?;
        drop(tx);

        let candidate = allocation.codes.into_iter().next().ok_or_else(|| {
            CoreError::Internal(format!("{module} の次コードを計算できません"))
        })?;

        Ok(CodePreview {
            module,
            context,
            code: candidate.code,
            sequence: candidate.sequence,
            locked: config.is_locked(),
        })
    }
}
