//! # FormatConfigRepository
//!
//! 書式設定と連番カウンターの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **悲観的ロック**: ロット予約中は `SELECT FOR UPDATE` で書式設定行を排他ロックし、
//!   同じモジュール・コンテキストの予約を直列化する
//! - **遅延作成**: 行がなければ既定値で `INSERT ... ON CONFLICT DO NOTHING` してから
//!   ロックするため、初回アクセスが並行しても 1 行に収束する
//! - **NULL コンテキスト**: `IS NOT DISTINCT FROM` で NULL 同士を一致させる
//! - **プレフィックスの取得**: プレフィックスはモジュールをまたいで一意である必要があるが、
//!   同一モジュールの複数コンテキストでは共有できるため一意制約では表せない。
//!   変更はトランザクション単位のアドバイザリロックで直列化し、ロック取得後に所有者を確認する

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ludo_domain::barcode::{
    BarcodeContext,
    BarcodeModule,
    FormatConfig,
    FormatConfigData,
    FormatConfigId,
    SequenceReset,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// 書式設定リポジトリトレイト
#[async_trait]
pub trait FormatConfigRepository: Send + Sync {
    /// モジュール・コンテキストで書式設定を取得する（ロックなし）
    async fn find(
        &self,
        module: BarcodeModule,
        context: &BarcodeContext,
    ) -> Result<Option<FormatConfig>, InfraError>;

    /// すべての書式設定を取得する
    ///
    /// スキャン時のプレフィックス表の構築に使う。
    async fn find_all(&self) -> Result<Vec<FormatConfig>, InfraError>;

    /// 書式設定行をロックして取得する
    ///
    /// 行が存在しなければ `initial` を挿入してからロックする。
    /// ロックはトランザクション終了まで保持される。
    async fn lock_or_create(
        &self,
        tx: &mut TxContext,
        initial: &FormatConfig,
    ) -> Result<FormatConfig, InfraError>;

    /// 書式設定を更新する
    async fn update(&self, tx: &mut TxContext, config: &FormatConfig) -> Result<(), InfraError>;

    /// プレフィックス変更用のロックを取得する
    ///
    /// トランザクション終了まで保持され、プレフィックスを変更する更新同士を直列化する。
    async fn lock_prefix_claims(&self, tx: &mut TxContext) -> Result<(), InfraError>;

    /// プレフィックスを使用している書式設定を取得する（トランザクション内）
    async fn find_by_prefix(
        &self,
        tx: &mut TxContext,
        prefix: &str,
    ) -> Result<Vec<FormatConfig>, InfraError>;
}

/// プレフィックス変更を直列化するアドバイザリロックのキー
const PREFIX_CLAIM_LOCK_KEY: i64 = 0x6c75_646f_7072_6678;

/// DB の barcode_format_configs テーブルの行を表す中間構造体
#[derive(sqlx::FromRow)]
struct FormatConfigRow {
    id: Uuid,
    module: String,
    organisation_id: Option<i64>,
    structure_id: Option<i64>,
    group_id: Option<i64>,
    pattern: String,
    prefix: String,
    sequence_reset: String,
    current_sequence: i64,
    current_period: Option<String>,
    locked: bool,
    burn_on_cancel: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FormatConfigRow> for FormatConfig {
    type Error = InfraError;

    fn try_from(row: FormatConfigRow) -> Result<Self, Self::Error> {
        Ok(FormatConfig::from_db(FormatConfigData {
            id: FormatConfigId::from_uuid(row.id),
            module: row
                .module
                .parse::<BarcodeModule>()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
            context: BarcodeContext::new(row.organisation_id, row.structure_id, row.group_id),
            pattern: row.pattern,
            prefix: row.prefix,
            sequence_reset: row
                .sequence_reset
                .parse::<SequenceReset>()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
            current_sequence: row.current_sequence,
            current_period: row.current_period,
            locked: row.locked,
            burn_on_cancel: row.burn_on_cancel,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, module, organisation_id, structure_id, group_id,
        pattern, prefix, sequence_reset, current_sequence, current_period,
        locked, burn_on_cancel, created_at, updated_at
    FROM barcode_format_configs
"#;

const SCOPE_CONDITION: &str = r#"
    WHERE module = $1
      AND organisation_id IS NOT DISTINCT FROM $2
      AND structure_id IS NOT DISTINCT FROM $3
      AND group_id IS NOT DISTINCT FROM $4
"#;

/// PostgreSQL 実装の FormatConfigRepository
#[derive(Debug, Clone)]
pub struct PostgresFormatConfigRepository {
    pool: PgPool,
}

impl PostgresFormatConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FormatConfigRepository for PostgresFormatConfigRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%module, %context))]
    async fn find(
        &self,
        module: BarcodeModule,
        context: &BarcodeContext,
    ) -> Result<Option<FormatConfig>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} {SCOPE_CONDITION}");
        let row = sqlx::query_as::<_, FormatConfigRow>(&sql)
            .bind(module.as_str())
            .bind(context.organisation_id)
            .bind(context.structure_id)
            .bind(context.group_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(FormatConfig::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_all(&self) -> Result<Vec<FormatConfig>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY module, created_at");
        let rows = sqlx::query_as::<_, FormatConfigRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(FormatConfig::try_from).collect()
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(module = %initial.module(), context = %initial.context())
    )]
    async fn lock_or_create(
        &self,
        tx: &mut TxContext,
        initial: &FormatConfig,
    ) -> Result<FormatConfig, InfraError> {
        let context = initial.context();
        let sequence_reset: &str = initial.sequence_reset().into();

        sqlx::query(
            r#"
            INSERT INTO barcode_format_configs (
                id, module, organisation_id, structure_id, group_id,
                pattern, prefix, sequence_reset, current_sequence, current_period,
                locked, burn_on_cancel, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT ON CONSTRAINT barcode_format_configs_scope_key DO NOTHING
            "#,
        )
        .bind(initial.id().as_uuid())
        .bind(initial.module().as_str())
        .bind(context.organisation_id)
        .bind(context.structure_id)
        .bind(context.group_id)
        .bind(initial.pattern())
        .bind(initial.prefix())
        .bind(sequence_reset)
        .bind(initial.current_sequence())
        .bind(initial.current_period())
        .bind(initial.is_locked())
        .bind(initial.burn_on_cancel())
        .bind(initial.created_at())
        .bind(initial.updated_at())
        .execute(tx.conn())
        .await?;

        let sql = format!("{SELECT_COLUMNS} {SCOPE_CONDITION} FOR UPDATE");
        let row = sqlx::query_as::<_, FormatConfigRow>(&sql)
            .bind(initial.module().as_str())
            .bind(context.organisation_id)
            .bind(context.structure_id)
            .bind(context.group_id)
            .fetch_one(tx.conn())
            .await?;

        FormatConfig::try_from(row)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn lock_prefix_claims(&self, tx: &mut TxContext) -> Result<(), InfraError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PREFIX_CLAIM_LOCK_KEY)
            .execute(tx.conn())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%prefix))]
    async fn find_by_prefix(
        &self,
        tx: &mut TxContext,
        prefix: &str,
    ) -> Result<Vec<FormatConfig>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE prefix = $1 ORDER BY module, created_at");
        let rows = sqlx::query_as::<_, FormatConfigRow>(&sql)
            .bind(prefix)
            .fetch_all(tx.conn())
            .await?;

        rows.into_iter().map(FormatConfig::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %config.id()))]
    async fn update(&self, tx: &mut TxContext, config: &FormatConfig) -> Result<(), InfraError> {
        let sequence_reset: &str = config.sequence_reset().into();
        let result = sqlx::query(
            r#"
            UPDATE barcode_format_configs SET
                pattern = $2,
                prefix = $3,
                sequence_reset = $4,
                current_sequence = $5,
                current_period = $6,
                locked = $7,
                burn_on_cancel = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(config.id().as_uuid())
        .bind(config.pattern())
        .bind(config.prefix())
        .bind(sequence_reset)
        .bind(config.current_sequence())
        .bind(config.current_period())
        .bind(config.is_locked())
        .bind(config.burn_on_cancel())
        .bind(config.updated_at())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict(
                "FormatConfig",
                config.id().to_string(),
            ));
        }

        Ok(())
    }
}
