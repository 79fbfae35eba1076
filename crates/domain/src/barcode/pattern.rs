//! # 書式パターン
//!
//! `{PREFIX}{YEAR4}{SEQ8}` のようなトークン文字列を解釈し、
//! 連番と日付からコード文字列を組み立てる。
//!
//! ## トークン
//!
//! | トークン | 出力例（2026-03-07, 連番 42, プレフィックス JEU） |
//! |---------|------|
//! | `PREFIX` | `JEU` |
//! | `YEAR4` / `YEAR2` | `2026` / `26` |
//! | `MONTH2` / `MONTH` | `03` / `3` |
//! | `DAY2` / `DAY` | `07` / `7` |
//! | `SEQ4` / `SEQ6` / `SEQ8` / `SEQ10` | `0042` / `000042` / `00000042` / `0000000042` |
//!
//! 認識できないトークンはエラーにせず、波括弧ごとそのまま出力する。
//! 書式は編集時に [`validate_pattern`] で検証済みである前提。

use chrono::{Datelike, NaiveDate};
use strum::IntoStaticStr;

use crate::DomainError;

/// スキャン時にモジュール判定に使うプレフィックス長
pub const PREFIX_LENGTH: usize = 3;

/// 書式パターンの最大文字数（DB: `VARCHAR(64)`）
pub const MAX_PATTERN_LENGTH: usize = 64;

/// 書式設定を新規作成するときの既定パターン
pub const DEFAULT_PATTERN: &str = "{PREFIX}{SEQ8}";

/// フォールバックコード（プレフィックス + エンティティ ID）の桁数
pub const FALLBACK_SEQUENCE_WIDTH: usize = 8;

/// 書式トークン
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Token {
    Prefix,
    Year4,
    Year2,
    Month2,
    Month,
    Day2,
    Day,
    Seq4,
    Seq6,
    Seq8,
    Seq10,
}

impl Token {
    /// トークン名（波括弧の内側）から変換する
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PREFIX" => Some(Self::Prefix),
            "YEAR4" => Some(Self::Year4),
            "YEAR2" => Some(Self::Year2),
            "MONTH2" => Some(Self::Month2),
            "MONTH" => Some(Self::Month),
            "DAY2" => Some(Self::Day2),
            "DAY" => Some(Self::Day),
            "SEQ4" => Some(Self::Seq4),
            "SEQ6" => Some(Self::Seq6),
            "SEQ8" => Some(Self::Seq8),
            "SEQ10" => Some(Self::Seq10),
            _ => None,
        }
    }

    /// SEQ トークンのゼロ埋め桁数
    pub fn sequence_width(&self) -> Option<usize> {
        match self {
            Self::Seq4 => Some(4),
            Self::Seq6 => Some(6),
            Self::Seq8 => Some(8),
            Self::Seq10 => Some(10),
            _ => None,
        }
    }

    fn write(&self, out: &mut String, sequence: i64, prefix: &str, date: NaiveDate) {
        use std::fmt::Write as _;

        // String への書き込みは失敗しない
        let _ = match self {
            Self::Prefix => write!(out, "{prefix}"),
            Self::Year4 => write!(out, "{:04}", date.year()),
            Self::Year2 => write!(out, "{:02}", date.year().rem_euclid(100)),
            Self::Month2 => write!(out, "{:02}", date.month()),
            Self::Month => write!(out, "{}", date.month()),
            Self::Day2 => write!(out, "{:02}", date.day()),
            Self::Day => write!(out, "{}", date.day()),
            Self::Seq4 | Self::Seq6 | Self::Seq8 | Self::Seq10 => {
                let width = self.sequence_width().unwrap_or_default();
                write!(out, "{sequence:0width$}")
            }
        };
    }
}

/// パターンを構成する断片
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Token(Token),
}

/// パターンを断片に分解する
///
/// `{NAME}` のうち NAME が既知トークンのものだけを [`Segment::Token`] にする。
/// 閉じ括弧のない `{` や未知の名前はリテラルとして残す。
fn segments(pattern: &str) -> Vec<Segment<'_>> {
    let mut result = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            break;
        };
        let name = &after_open[..close];

        // "{A{SEQ8}" のように内側にも '{' がある場合は、内側から読み直す
        if let Some(inner) = name.rfind('{') {
            let literal_end = open + 1 + inner;
            result.push(Segment::Literal(&rest[..literal_end]));
            rest = &rest[literal_end..];
            continue;
        }

        if open > 0 {
            result.push(Segment::Literal(&rest[..open]));
        }
        let token_end = open + 1 + close + 1;
        match Token::from_name(name) {
            Some(token) => result.push(Segment::Token(token)),
            None => result.push(Segment::Literal(&rest[open..token_end])),
        }
        rest = &rest[token_end..];
    }

    if !rest.is_empty() {
        result.push(Segment::Literal(rest));
    }
    result
}

/// パターンからコード文字列を生成する
///
/// ゼロ埋めは最小桁数であり、桁数を超える連番はそのまま全桁を出力する。
///
/// # 使用例
///
/// ```rust
/// use chrono::NaiveDate;
/// use ludo_domain::barcode::render;
///
/// let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
/// assert_eq!(render("{PREFIX}{SEQ8}", 1, "JEU", date), "JEU00000001");
/// assert_eq!(render("{PREFIX}-{YEAR2}{MONTH2}-{SEQ4}", 42, "LIV", date), "LIV-2603-0042");
/// assert_eq!(render("{PREFIX}{LOT}{SEQ4}", 7, "DIS", date), "DIS{LOT}0007");
/// ```
pub fn render(pattern: &str, sequence: i64, prefix: &str, date: NaiveDate) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    for segment in segments(pattern) {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Token(token) => token.write(&mut out, sequence, prefix, date),
        }
    }
    out
}

/// 書式パターンを検証する（編集時）
///
/// - 空ではなく [`MAX_PATTERN_LENGTH`] 文字以内
/// - `{PREFIX}` で始まる（スキャン時にプレフィックスでモジュールを判定するため）
/// - SEQ トークンをちょうど 1 つ含む
/// - 固定文字に英小文字と空白を含まない（スキャン入力は前後の空白を除き大文字化して照合する）
pub fn validate_pattern(pattern: &str) -> Result<(), DomainError> {
    if pattern.trim().is_empty() {
        return Err(DomainError::Validation(
            "書式パターンは必須です".to_string(),
        ));
    }

    if pattern.chars().count() > MAX_PATTERN_LENGTH {
        return Err(DomainError::Validation(format!(
            "書式パターンは {MAX_PATTERN_LENGTH} 文字以内である必要があります"
        )));
    }

    let parts = segments(pattern);
    if parts.first() != Some(&Segment::Token(Token::Prefix)) {
        return Err(DomainError::Validation(
            "書式パターンは {PREFIX} で始まる必要があります".to_string(),
        ));
    }

    let sequence_tokens = parts
        .iter()
        .filter(|s| matches!(s, Segment::Token(t) if t.sequence_width().is_some()))
        .count();
    if sequence_tokens != 1 {
        return Err(DomainError::Validation(format!(
            "書式パターンには SEQ トークンがちょうど 1 つ必要です（検出: {sequence_tokens}）"
        )));
    }

    let unstable = parts.iter().find_map(|s| match s {
        Segment::Literal(text) if !survives_normalization(text) => Some(*text),
        _ => None,
    });
    if let Some(text) = unstable {
        return Err(DomainError::Validation(format!(
            "書式パターンの固定文字は英大文字・数字・記号で指定してください（指定: {text:?}）"
        )));
    }

    Ok(())
}

/// スキャン入力の正規化で変化しない文字列か
fn survives_normalization(text: &str) -> bool {
    text.chars()
        .all(|c| !c.is_ascii_lowercase() && !c.is_whitespace())
}

/// プレフィックスを検証し、大文字に正規化して返す
///
/// [`PREFIX_LENGTH`] 文字の ASCII 英数字のみ許可する。
pub fn validate_prefix(prefix: &str) -> Result<String, DomainError> {
    let normalized = prefix.trim().to_ascii_uppercase();
    if normalized.len() != PREFIX_LENGTH
        || !normalized.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(DomainError::Validation(format!(
            "プレフィックスは {PREFIX_LENGTH} 文字の英数字である必要があります（指定: {prefix:?}）"
        )));
    }
    Ok(normalized)
}
