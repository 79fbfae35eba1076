//! モジュール種別（コードを発行するカタログの区分）

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoStaticStr};

use crate::DomainError;

/// バーコードを発行するモジュール
///
/// モジュールごとにコードテーブルと既定プレフィックスを持つ。
/// コード文字列はプレフィックスによってモジュールを一意に決定する。
///
/// # 使用例
///
/// ```rust
/// use ludo_domain::barcode::BarcodeModule;
///
/// let module: BarcodeModule = "game".parse().unwrap();
/// assert_eq!(module, BarcodeModule::Game);
/// assert_eq!(module.default_prefix(), "JEU");
/// // 旧システムのフランス語名も受け付ける
/// assert_eq!("livre".parse::<BarcodeModule>().unwrap(), BarcodeModule::Book);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    EnumIter,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BarcodeModule {
    /// 会員（利用者カード）
    Member,
    /// ゲーム
    Game,
    /// 書籍
    Book,
    /// 映画
    Film,
    /// ディスク（音楽 CD など）
    Disc,
}

impl BarcodeModule {
    /// 文字列表現（DB 値）
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// 既定のプレフィックス
    pub fn default_prefix(&self) -> &'static str {
        match self {
            Self::Member => "USA",
            Self::Game => "JEU",
            Self::Book => "LIV",
            Self::Film => "FIL",
            Self::Disc => "DIS",
        }
    }

    /// 過去に発行されたラベルで使われていた別名プレフィックス
    pub fn legacy_prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Member => &["ADH"],
            Self::Game | Self::Book => &[],
            Self::Film => &["DVD"],
            Self::Disc => &["CDA"],
        }
    }
}

impl std::str::FromStr for BarcodeModule {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "adherent" | "utilisateur" => Ok(Self::Member),
            "game" | "jeu" => Ok(Self::Game),
            "book" | "livre" => Ok(Self::Book),
            "film" => Ok(Self::Film),
            "disc" | "disque" => Ok(Self::Disc),
            _ => Err(DomainError::InvalidModule(s.to_string())),
        }
    }
}
