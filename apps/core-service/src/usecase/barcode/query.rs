//! 割り当て可能コードの一覧とスキャン判定

use ludo_domain::barcode::{BarcodeModule, CodeRecord, LotId, ScanResolver, ScanResult};

use super::{BarcodeUseCaseImpl, clamp_limit};
use crate::error::CoreError;

impl BarcodeUseCaseImpl {
    /// 予約済み（割り当て可能）のコードを連番順に取得する
    ///
    /// `limit` は既定 100 件、最大 1000 件に丸める。
    pub async fn list_available_codes(
        &self,
        module: BarcodeModule,
        lot_id: Option<LotId>,
        limit: Option<i64>,
    ) -> Result<Vec<CodeRecord>, CoreError> {
        Ok(self
            .code_repo(module)
            .list_available(lot_id.as_ref(), clamp_limit(limit))
            .await?)
    }

    /// スキャンしたコードのモジュールと利用可否を判定する
    ///
    /// ## 処理フロー
    ///
    /// 1. 前後の空白を除いて大文字にする
    /// 2. 先頭 3 文字のプレフィックスからモジュールを判定
    ///    （既定・旧プレフィックスと保存済み書式のプレフィックス）
    /// 3. そのモジュールのテーブルでレコードを探し、状態から判定する
    pub async fn resolve_scanned_code(&self, raw: &str) -> Result<ScanResult, CoreError> {
        // 1. 正規化
        let code = ScanResolver::normalize(raw);

        // 2. モジュール判定
        let resolver = ScanResolver::new(self.prefix_table().await?);
        let Some(module) = resolver.identify(&code) else {
            tracing::debug!(code = %code, "プレフィックスが一致しないスキャン");
            return Ok(ScanResult::not_recognized(code));
        };

        // 3. レコードから判定
        let record = self.code_repo(module).find_by_code(&code).await?;
        Ok(resolver.evaluate(code, module, record.as_ref()))
    }
}
