//! 採番コンテキスト（組織・拠点・グループ）

use serde::{Deserialize, Serialize};

/// 書式設定とロットを区別するコンテキスト
///
/// すべて `None` の場合はグローバル既定。
/// 組織・拠点・グループごとに独立した書式と連番を持てる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BarcodeContext {
    pub organisation_id: Option<i64>,
    pub structure_id:    Option<i64>,
    pub group_id:        Option<i64>,
}

impl BarcodeContext {
    /// グローバル既定のコンテキスト
    pub fn global() -> Self {
        Self::default()
    }

    pub fn new(
        organisation_id: Option<i64>,
        structure_id: Option<i64>,
        group_id: Option<i64>,
    ) -> Self {
        Self {
            organisation_id,
            structure_id,
            group_id,
        }
    }

    pub fn is_global(&self) -> bool {
        self.organisation_id.is_none() && self.structure_id.is_none() && self.group_id.is_none()
    }
}

impl std::fmt::Display for BarcodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_global() {
            return write!(f, "global");
        }
        let part = |v: Option<i64>| v.map_or_else(|| "-".to_string(), |id| id.to_string());
        write!(
            f,
            "org={}/structure={}/group={}",
            part(self.organisation_id),
            part(self.structure_id),
            part(self.group_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_グローバルコンテキストの表示() {
        assert!(BarcodeContext::global().is_global());
        assert_eq!(BarcodeContext::global().to_string(), "global");
    }

    #[test]
    fn test_部分的なコンテキストの表示() {
        let context = BarcodeContext::new(Some(3), None, Some(7));
        assert!(!context.is_global());
        assert_eq!(context.to_string(), "org=3/structure=-/group=7");
    }
}
