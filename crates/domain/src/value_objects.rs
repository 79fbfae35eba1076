//! # 共通値オブジェクト
//!
//! 複数のエンティティで共有される値オブジェクトを定義する。
//!
//! ## 含まれる型
//!
//! | 型 | ラップ対象 | 用途 |
//! |---|-----------|------|
//! | [`EntityId`] | `i64` | コードを保持するカタログ行（会員・ゲーム・書籍など）の ID |
//! | [`LotQuantity`] | `u32` | 1 ロットあたりの予約数（1〜1000） |
//! | [`ActorId`] | `Uuid` | 操作を行った利用者 |

use serde::{Deserialize, Serialize};

use crate::DomainError;

// =========================================================================
// EntityId（カタログ行 ID）
// =========================================================================

/// コードの割り当て先となるカタログ行の ID（値オブジェクト）
///
/// 会員・ゲーム・書籍・映画・ディスクの各テーブルの主キーを指す。
/// 参照先テーブルはコードのモジュールで決まる。
///
/// # 不変条件
///
/// - 1 以上の正整数
///
/// # 使用例
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use ludo_domain::value_objects::EntityId;
///
/// let id = EntityId::new(99)?;
/// assert_eq!(id.as_i64(), 99);
/// assert!(EntityId::new(0).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// 指定した値からエンティティ ID を作成する
    ///
    /// # エラー
    ///
    /// 0 以下の場合は `DomainError::Validation` を返す。
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::Validation(format!(
                "エンティティ ID は 1 以上である必要があります（指定: {value}）"
            )));
        }
        Ok(Self(value))
    }

    /// 内部の i64 値を取得する
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =========================================================================
// LotQuantity（ロット予約数）
// =========================================================================

/// 1 ロットで予約できるコード数（値オブジェクト）
///
/// # 不変条件
///
/// - [`LotQuantity::MIN`] 以上 [`LotQuantity::MAX`] 以下
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LotQuantity(u32);

impl LotQuantity {
    /// 最小予約数
    pub const MIN: u32 = 1;
    /// 最大予約数
    pub const MAX: u32 = 1000;

    /// 予約数を検証して作成する
    ///
    /// 範囲外は `DomainError::InvalidQuantity`。呼び出し元の入力をそのまま
    /// 受け取れるよう `i64` を引数に取る。
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(DomainError::InvalidQuantity {
                requested: value,
                min:       Self::MIN,
                max:       Self::MAX,
            });
        }
        Ok(Self(value as u32))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

// =========================================================================
// ActorId（操作者）
// =========================================================================

define_uuid_id! {
    /// 操作を行った利用者の ID
    ///
    /// 認証は外部の責務。ここでは監査用に記録するだけ。
    pub struct ActorId;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_エンティティidは正の整数を受け付ける() {
        let id = EntityId::new(42).unwrap();
        assert_eq!(id.as_i64(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    fn test_エンティティidは0以下を拒否する(#[case] value: i64) {
        assert!(matches!(EntityId::new(value), Err(DomainError::Validation(_))));
    }

    #[rstest]
    #[case(1)]
    #[case(50)]
    #[case(1000)]
    fn test_予約数は範囲内なら作成できる(#[case] value: i64) {
        assert_eq!(LotQuantity::new(value).unwrap().as_u32() as i64, value);
    }

    #[rstest]
    #[case(0)]
    #[case(-5)]
    #[case(1001)]
    fn test_予約数は範囲外ならinvalid_quantity(#[case] value: i64) {
        assert_eq!(
            LotQuantity::new(value),
            Err(DomainError::InvalidQuantity {
                requested: value,
                min:       1,
                max:       1000,
            })
        );
    }
}
