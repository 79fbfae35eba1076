//! ユースケース層の共通ヘルパー
//!
//! リポジトリ呼び出し結果の変換など、複数のユースケースで繰り返されるパターンを共通化する。

use ludo_domain::DomainError;
use ludo_infra::InfraError;

use crate::error::CoreError;

/// リポジトリの `Result<Option<T>, InfraError>` を `Result<T, CoreError>` に変換する
///
/// `None` はドメインの「見つからない」エラーに、`InfraError` は
/// [`CoreError::Database`] に変換する（リトライ判定を保つため文字列化しない）。
///
/// ```ignore
/// let lot = self.lot_repo.find_by_id(&lot_id).await
///     .or_not_found(|| DomainError::LotNotFound { lot_id: lot_id.to_string() })?;
/// ```
pub(crate) trait FindResultExt<T> {
    fn or_not_found(self, not_found: impl FnOnce() -> DomainError) -> Result<T, CoreError>;
}

impl<T> FindResultExt<T> for Result<Option<T>, InfraError> {
    fn or_not_found(self, not_found: impl FnOnce() -> DomainError) -> Result<T, CoreError> {
        self?.ok_or_else(|| CoreError::Domain(not_found()))
    }
}
