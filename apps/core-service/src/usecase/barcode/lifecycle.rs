//! コードの割り当て・取消・復元
//!
//! いずれも「ロックなしで読んで所属ロットを知る → ロット行をロック →
//! コード行をロックして再検証」の順で進める。ロット予約・ロット取消と
//! 同じロック順序になる。

use ludo_domain::{
    DomainError,
    barcode::{
        BarcodeContext,
        BarcodeModule,
        CodeRecord,
        CodeRef,
        CodeStatus,
        Lot,
        ScanResolver,
    },
};
use ludo_infra::db::TxContext;
use ludo_shared::{event_log::event, log_business_event};

use super::{AssignCodeInput, AssignedCode, BarcodeUseCaseImpl, ensure_same_lot, not_found};
use crate::{error::CoreError, usecase::helpers::FindResultExt};

impl BarcodeUseCaseImpl {
    /// カタログ行にコードを割り当てる
    ///
    /// ## 処理フロー
    ///
    /// 1. コードを決める（未指定ならグローバル書式のフォールバックコード）
    /// 2. プレフィックスが未登録か別モジュールのものなら拒否
    /// 3. 既存レコードを読み、所属ロットがあればロック
    /// 4. コード行をロックして再検証
    ///    - なし: 予約なしの使用済みレコードとして登録
    ///    - 予約済み: 使用済みにしてロットの使用数を加算
    ///    - 取消済み・使用済み・焼却済み: 拒否
    /// 5. コミット
    pub async fn assign_code(&self, input: AssignCodeInput) -> Result<AssignedCode, CoreError> {
        let module = input.module;
        let now = self.clock.now();

        // 1. コードの決定
        let code = match &input.code {
            Some(code) => ScanResolver::normalize(code),
            None => self
                .get_config(module, BarcodeContext::global())
                .await?
                .fallback_code(input.entity_id),
        };
        if code.is_empty() {
            return Err(DomainError::Validation("コードが空です".to_string()).into());
        }

        // 2. モジュールの整合性
        let Some(actual) = self.prefix_table().await?.identify(&code) else {
            return Err(DomainError::Validation(format!(
                "プレフィックスからモジュールを判定できないコードです: {code}"
            ))
            .into());
        };
        if actual != module {
            return Err(DomainError::ModuleMismatch {
                expected: module,
                actual,
                code,
            }
            .into());
        }

        // 3. 所属ロットをロック
        let code_repo = self.code_repo(module);
        let existing = code_repo.find_by_code(&code).await?;
        let mut tx = self.tx_manager.begin().await?;
        let lot = self.lock_lot_of(&mut tx, existing.as_ref()).await?;

        // 4. コード行をロックして再検証
        let record = code_repo
            .find_for_update(&mut tx, &CodeRef::Code(code.clone()))
            .await?;

        let (record, lot, ad_hoc) = match record {
            None => {
                let record = CodeRecord::ad_hoc_used(module, code, input.entity_id, now);
                code_repo.insert(&mut tx, &record).await?;
                (record, None, true)
            }
            Some(record) => {
                ensure_same_lot(&record, lot.as_ref())?;
                let previous = record.status();
                let record = record.assigned(input.entity_id, now)?;
                code_repo.update(&mut tx, &record, previous).await?;

                let lot = match lot {
                    Some(lot) => {
                        let lot = lot.record_use(now)?;
                        self.lot_repo.update(&mut tx, &lot).await?;
                        Some(lot)
                    }
                    None => None,
                };
                (record, lot, false)
            }
        };

        // 5. コミット
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = event::action::CODE_ASSIGNED,
            event.entity_type = event::entity_type::CODE,
            event.entity_id = %record.id(),
            event.module = %module,
            event.result = event::result::SUCCESS,
            barcode.code = record.code(),
            barcode.assigned_to = %input.entity_id,
            barcode.ad_hoc = ad_hoc,
            "コードを割り当て"
        );
        if let Some(lot) = lot.as_ref().filter(|l| l.completed_at() == Some(now)) {
            log_business_event!(
                event.category = event::category::BARCODE,
                event.action = event::action::LOT_COMPLETED,
                event.entity_type = event::entity_type::LOT,
                event.entity_id = %lot.id(),
                event.module = %module,
                event.result = event::result::SUCCESS,
                "ロットのコードがすべて使用されました"
            );
        }

        Ok(AssignedCode {
            record,
            lot,
            ad_hoc,
        })
    }

    /// コードを取り消す（または焼却する）
    ///
    /// `burn` が未指定なら、所属ロットのコンテキスト（ロットがなければグローバル）の
    /// 書式設定の取消方針に従う。取消済みのコードは焼却指定のときだけ焼却に進め、
    /// ロットの取消数は変えない。
    pub async fn cancel_code(
        &self,
        module: BarcodeModule,
        code: CodeRef,
        burn: Option<bool>,
    ) -> Result<CodeRecord, CoreError> {
        let code = normalized(code);
        let code_repo = self.code_repo(module);
        let existing = self
            .find_code(module, &code)
            .await
            .or_not_found(not_found(module, &code))?;

        let burn = match burn {
            Some(burn) => burn,
            None => self.burn_policy_of(&existing).await?,
        };

        let now = self.clock.now();
        let mut tx = self.tx_manager.begin().await?;
        let lot = self.lock_lot_of(&mut tx, Some(&existing)).await?;

        let record = code_repo
            .find_for_update(&mut tx, &code)
            .await
            .or_not_found(not_found(module, &code))?;
        ensure_same_lot(&record, lot.as_ref())?;

        let previous = record.status();
        let record = record.cancelled(burn, now)?;
        code_repo.update(&mut tx, &record, previous).await?;

        // 予約済みからの遷移だけを数える
        if let (CodeStatus::Reserved, Some(lot)) = (previous, lot) {
            let lot = lot.record_cancellation(now)?;
            self.lot_repo.update(&mut tx, &lot).await?;
        }

        tx.commit().await?;

        let action = match record.status() {
            CodeStatus::Burned => event::action::CODE_BURNED,
            _ => event::action::CODE_CANCELLED,
        };
        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = action,
            event.entity_type = event::entity_type::CODE,
            event.entity_id = %record.id(),
            event.module = %module,
            event.result = event::result::SUCCESS,
            barcode.code = record.code(),
            barcode.previous_status = %previous,
            "コードを取消"
        );

        Ok(record)
    }

    /// 取り消されたコードを予約済みに戻す
    ///
    /// 所属ロットが取り消されていても復元でき、ロットの状態は変えない。
    pub async fn restore_code(
        &self,
        module: BarcodeModule,
        code: CodeRef,
    ) -> Result<CodeRecord, CoreError> {
        let code = normalized(code);
        let code_repo = self.code_repo(module);
        let existing = self
            .find_code(module, &code)
            .await
            .or_not_found(not_found(module, &code))?;

        let now = self.clock.now();
        let mut tx = self.tx_manager.begin().await?;
        let lot = self.lock_lot_of(&mut tx, Some(&existing)).await?;

        let record = code_repo
            .find_for_update(&mut tx, &code)
            .await
            .or_not_found(not_found(module, &code))?;
        ensure_same_lot(&record, lot.as_ref())?;

        let record = record.restored(now)?;
        code_repo
            .update(&mut tx, &record, CodeStatus::Cancelled)
            .await?;

        if let Some(lot) = lot {
            let lot = lot.record_restoration(now)?;
            self.lot_repo.update(&mut tx, &lot).await?;
        }

        tx.commit().await?;

        log_business_event!(
            event.category = event::category::BARCODE,
            event.action = event::action::CODE_RESTORED,
            event.entity_type = event::entity_type::CODE,
            event.entity_id = %record.id(),
            event.module = %module,
            event.result = event::result::SUCCESS,
            barcode.code = record.code(),
            "コードを復元"
        );

        Ok(record)
    }

    /// コード文字列または ID でロックなしに取得する
    async fn find_code(
        &self,
        module: BarcodeModule,
        code: &CodeRef,
    ) -> Result<Option<CodeRecord>, ludo_infra::InfraError> {
        let code_repo = self.code_repo(module);
        match code {
            CodeRef::Code(code) => code_repo.find_by_code(code).await,
            CodeRef::Id(id) => code_repo.find_by_id(id).await,
        }
    }

    /// コードの所属ロットを行ロックする
    ///
    /// ロットに属さないコードなら `None`。
    async fn lock_lot_of(
        &self,
        tx: &mut TxContext,
        record: Option<&CodeRecord>,
    ) -> Result<Option<Lot>, CoreError> {
        let Some(lot_id) = record.and_then(CodeRecord::lot_id) else {
            return Ok(None);
        };
        let lot = self
            .lot_repo
            .find_for_update(tx, lot_id)
            .await
            .or_not_found(|| DomainError::LotNotFound {
                lot_id: lot_id.to_string(),
            })?;
        Ok(Some(lot))
    }

    /// 所属ロットのコンテキスト（なければグローバル）の取消方針
    async fn burn_policy_of(&self, record: &CodeRecord) -> Result<bool, CoreError> {
        let context = match record.lot_id() {
            Some(lot_id) => self
                .lot_repo
                .find_by_id(lot_id)
                .await?
                .map(|lot| lot.context())
                .unwrap_or_default(),
            None => BarcodeContext::global(),
        };
        self.burn_policy(record.module(), &context).await
    }
}

/// コード文字列をスキャン時と同じ規則で正規化する
fn normalized(code: CodeRef) -> CodeRef {
    match code {
        CodeRef::Code(code) => CodeRef::Code(ScanResolver::normalize(&code)),
        id => id,
    }
}
