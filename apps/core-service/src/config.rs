//! # Core Service 設定
//!
//! 環境変数から採番サービスの設定を読み込む。
//!
//! | 変数名 | 必須 | 既定値 |
//! |--------|------|--------|
//! | `DATABASE_URL` | **Yes** | - |
//! | `DATABASE_MAX_CONNECTIONS` | No | `10` |
//! | `BARCODE_RESERVE_MAX_ATTEMPTS` | No | `3`（1 以上） |
//! | `BARCODE_COLLISION_BUDGET` | No | `10000` |
//! | `LOG_FORMAT` | No | `pretty` |

use ludo_domain::barcode::DEFAULT_COLLISION_BUDGET;
use ludo_shared::observability::{LogFormat, TracingConfig};
use thiserror::Error;

/// トレーシングに出力するサービス名
pub const SERVICE_NAME: &str = "ludo-core-service";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_RESERVE_MAX_ATTEMPTS: u32 = 3;

/// 設定読み込みエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    #[error("{key} の値が不正です: {value:?}（{reason}）")]
    Invalid {
        key:    &'static str,
        value:  String,
        reason: &'static str,
    },
}

/// 採番サービスの設定
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// データベース接続 URL
    pub database_url: String,
    /// 接続プールの最大接続数
    pub database_max_connections: u32,
    /// ロット予約の最大試行回数（リトライ可能なエラー時）
    pub reserve_max_attempts: u32,
    /// 1 回の予約でスキップできる衝突数の上限
    pub collision_budget: usize,
    /// トレーシング設定
    pub tracing: TracingConfig,
}

impl ServiceConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let database_max_connections = parse_or(
            &lookup,
            "DATABASE_MAX_CONNECTIONS",
            DEFAULT_MAX_CONNECTIONS,
            "1 以上の整数を指定してください",
        )?;
        let reserve_max_attempts = parse_or(
            &lookup,
            "BARCODE_RESERVE_MAX_ATTEMPTS",
            DEFAULT_RESERVE_MAX_ATTEMPTS,
            "1 以上の整数を指定してください",
        )?;
        let collision_budget = parse_or(
            &lookup,
            "BARCODE_COLLISION_BUDGET",
            DEFAULT_COLLISION_BUDGET,
            "0 以上の整数を指定してください",
        )?;

        if database_max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS", "0", "1 以上の整数を指定してください"));
        }
        if reserve_max_attempts == 0 {
            return Err(invalid(
                "BARCODE_RESERVE_MAX_ATTEMPTS",
                "0",
                "1 以上の整数を指定してください",
            ));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            reserve_max_attempts,
            collision_budget,
            tracing: TracingConfig::new(SERVICE_NAME, LogFormat::from_lookup(&lookup)),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| invalid(key, &value, reason)),
    }
}

fn invalid(key: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_必須項目のみで既定値が使われる() {
        let config =
            ServiceConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/ludo")]))
                .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/ludo");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.reserve_max_attempts, 3);
        assert_eq!(config.collision_budget, 10_000);
        assert_eq!(config.tracing.log_format, LogFormat::Pretty);
        assert_eq!(config.tracing.service_name, SERVICE_NAME);
    }

    #[test]
    fn test_すべての項目を上書きできる() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/ludo"),
            ("DATABASE_MAX_CONNECTIONS", "25"),
            ("BARCODE_RESERVE_MAX_ATTEMPTS", " 5 "),
            ("BARCODE_COLLISION_BUDGET", "500"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.database_max_connections, 25);
        assert_eq!(config.reserve_max_attempts, 5);
        assert_eq!(config.collision_budget, 500);
        assert_eq!(config.tracing.log_format, LogFormat::Json);
    }

    #[test]
    fn test_database_urlがなければmissing() {
        assert_eq!(
            ServiceConfig::from_lookup(lookup_from(&[])).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
        assert_eq!(
            ServiceConfig::from_lookup(lookup_from(&[("DATABASE_URL", "  ")])).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn test_数値でない値はinvalid() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/ludo"),
            ("BARCODE_COLLISION_BUDGET", "many"),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { key: "BARCODE_COLLISION_BUDGET", ref value, .. } if value == "many"
        ));
    }

    #[test]
    fn test_試行回数0は拒否する() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/ludo"),
            ("BARCODE_RESERVE_MAX_ATTEMPTS", "0"),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { key: "BARCODE_RESERVE_MAX_ATTEMPTS", .. }
        ));
    }

    #[test]
    fn test_最大接続数0は拒否する() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/ludo"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "DATABASE_MAX_CONNECTIONS", .. }));
    }
}
