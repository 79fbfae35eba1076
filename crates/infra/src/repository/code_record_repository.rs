//! # CodeRecordRepository
//!
//! コードレコードの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **モジュール別テーブル**: `member_codes` / `game_codes` / ... の各テーブルを
//!   同じトレイトで扱い、[`CodeRepositoryRegistry`] でモジュールから引く
//! - **状態の前提条件**: 更新は `WHERE status = $expected` 付きで行い、
//!   0 行なら [`InfraError::conflict`] を返す
//! - **一意制約**: `UNIQUE (code)` が並行予約に対する最後の防衛線。
//!   違反（23505）はリトライ可能なエラーとして扱われる

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ludo_domain::{
    barcode::{BarcodeModule, CodeRecord, CodeRecordData, CodeRecordId, CodeRef, CodeStatus, LotId},
    value_objects::EntityId,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// モジュールに対応するコードテーブル名
pub fn code_table(module: BarcodeModule) -> &'static str {
    match module {
        BarcodeModule::Member => "member_codes",
        BarcodeModule::Game => "game_codes",
        BarcodeModule::Book => "book_codes",
        BarcodeModule::Film => "film_codes",
        BarcodeModule::Disc => "disc_codes",
    }
}

/// コードレコードリポジトリトレイト
///
/// 1 インスタンスが 1 モジュール（1 テーブル）を担当する。
#[async_trait]
pub trait CodeRecordRepository: Send + Sync {
    /// 担当モジュール
    fn module(&self) -> BarcodeModule;

    /// コード文字列で取得する（ロックなし）
    async fn find_by_code(&self, code: &str) -> Result<Option<CodeRecord>, InfraError>;

    /// ID で取得する（ロックなし）
    async fn find_by_id(&self, id: &CodeRecordId) -> Result<Option<CodeRecord>, InfraError>;

    /// コード文字列または ID で取得し、行ロックを取る
    async fn find_for_update(
        &self,
        tx: &mut TxContext,
        code: &CodeRef,
    ) -> Result<Option<CodeRecord>, InfraError>;

    /// 指定したコードのうち既に存在するものを返す（ステータスは問わない）
    async fn find_existing_codes(
        &self,
        tx: &mut TxContext,
        codes: &[String],
    ) -> Result<Vec<String>, InfraError>;

    /// 1 件作成する
    async fn insert(&self, tx: &mut TxContext, record: &CodeRecord) -> Result<(), InfraError>;

    /// まとめて作成する
    async fn insert_many(
        &self,
        tx: &mut TxContext,
        records: &[CodeRecord],
    ) -> Result<(), InfraError>;

    /// ステータスが `expected` の場合のみ更新する
    async fn update(
        &self,
        tx: &mut TxContext,
        record: &CodeRecord,
        expected: CodeStatus,
    ) -> Result<(), InfraError>;

    /// ロット内の予約済みコードをすべて取消（焼却）にし、件数を返す
    async fn cancel_reserved_in_lot(
        &self,
        tx: &mut TxContext,
        lot_id: &LotId,
        burn: bool,
        now: DateTime<Utc>,
    ) -> Result<u32, InfraError>;

    /// ロットのコードを連番順に取得する
    async fn find_by_lot(&self, lot_id: &LotId) -> Result<Vec<CodeRecord>, InfraError>;

    /// 予約済み（割り当て可能）のコードを連番順に取得する
    async fn list_available(
        &self,
        lot_id: Option<&LotId>,
        limit: i64,
    ) -> Result<Vec<CodeRecord>, InfraError>;
}

/// DB のコードテーブルの行を表す中間構造体
#[derive(sqlx::FromRow)]
struct CodeRecordRow {
    id: Uuid,
    code: String,
    sequence: Option<i64>,
    lot_id: Option<Uuid>,
    status: String,
    entity_id: Option<i64>,
    reserved_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl CodeRecordRow {
    fn into_record(self, module: BarcodeModule) -> Result<CodeRecord, InfraError> {
        Ok(CodeRecord::from_db(CodeRecordData {
            id: CodeRecordId::from_uuid(self.id),
            module,
            code: self.code,
            sequence: self.sequence,
            lot_id: self.lot_id.map(LotId::from_uuid),
            status: self
                .status
                .parse::<CodeStatus>()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
            entity_id: self
                .entity_id
                .map(EntityId::new)
                .transpose()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
            reserved_at: self.reserved_at,
            used_at: self.used_at,
            cancelled_at: self.cancelled_at,
            updated_at: self.updated_at,
        }))
    }
}

const COLUMNS: &str = "id, code, sequence, lot_id, status, entity_id, \
                       reserved_at, used_at, cancelled_at, updated_at";

/// PostgreSQL 実装の CodeRecordRepository
#[derive(Debug, Clone)]
pub struct PostgresCodeRecordRepository {
    pool:   PgPool,
    module: BarcodeModule,
    table:  &'static str,
}

impl PostgresCodeRecordRepository {
    pub fn new(pool: PgPool, module: BarcodeModule) -> Self {
        Self {
            pool,
            module,
            table: code_table(module),
        }
    }

    fn select(&self) -> String {
        format!("SELECT {COLUMNS} FROM {}", self.table)
    }

    fn into_records(&self, rows: Vec<CodeRecordRow>) -> Result<Vec<CodeRecord>, InfraError> {
        rows.into_iter()
            .map(|row| row.into_record(self.module))
            .collect()
    }
}

#[async_trait]
impl CodeRecordRepository for PostgresCodeRecordRepository {
    fn module(&self) -> BarcodeModule {
        self.module
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, %code))]
    async fn find_by_code(&self, code: &str) -> Result<Option<CodeRecord>, InfraError> {
        let sql = format!("{} WHERE code = $1", self.select());
        let row = sqlx::query_as::<_, CodeRecordRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_record(self.module)).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, %id))]
    async fn find_by_id(&self, id: &CodeRecordId) -> Result<Option<CodeRecord>, InfraError> {
        let sql = format!("{} WHERE id = $1", self.select());
        let row = sqlx::query_as::<_, CodeRecordRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_record(self.module)).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, %code))]
    async fn find_for_update(
        &self,
        tx: &mut TxContext,
        code: &CodeRef,
    ) -> Result<Option<CodeRecord>, InfraError> {
        let row = match code {
            CodeRef::Code(code) => {
                let sql = format!("{} WHERE code = $1 FOR UPDATE", self.select());
                sqlx::query_as::<_, CodeRecordRow>(&sql)
                    .bind(code)
                    .fetch_optional(tx.conn())
                    .await?
            }
            CodeRef::Id(id) => {
                let sql = format!("{} WHERE id = $1 FOR UPDATE", self.select());
                sqlx::query_as::<_, CodeRecordRow>(&sql)
                    .bind(id.as_uuid())
                    .fetch_optional(tx.conn())
                    .await?
            }
        };

        row.map(|r| r.into_record(self.module)).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, count = codes.len()))]
    async fn find_existing_codes(
        &self,
        tx: &mut TxContext,
        codes: &[String],
    ) -> Result<Vec<String>, InfraError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT code FROM {} WHERE code = ANY($1)", self.table);
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(codes)
            .fetch_all(tx.conn())
            .await?;

        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, code = record.code()))]
    async fn insert(&self, tx: &mut TxContext, record: &CodeRecord) -> Result<(), InfraError> {
        self.insert_many(tx, std::slice::from_ref(record)).await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, count = records.len()))]
    async fn insert_many(
        &self,
        tx: &mut TxContext,
        records: &[CodeRecord],
    ) -> Result<(), InfraError> {
        if records.is_empty() {
            return Ok(());
        }

        // 1 ロット最大 1000 件 × 10 列でバインド上限（65535）に収まる
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("INSERT INTO {} ({COLUMNS}) ", self.table));
        builder.push_values(records, |mut row, record| {
            row.push_bind(*record.id().as_uuid())
                .push_bind(record.code().to_string())
                .push_bind(record.sequence())
                .push_bind(record.lot_id().map(|id| *id.as_uuid()))
                .push_bind(record.status().as_str())
                .push_bind(record.entity_id().map(|id| id.as_i64()))
                .push_bind(record.reserved_at())
                .push_bind(record.used_at())
                .push_bind(record.cancelled_at())
                .push_bind(record.updated_at());
        });
        builder.build().execute(tx.conn()).await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, code = record.code()))]
    async fn update(
        &self,
        tx: &mut TxContext,
        record: &CodeRecord,
        expected: CodeStatus,
    ) -> Result<(), InfraError> {
        let sql = format!(
            r#"
            UPDATE {} SET
                status = $3,
                entity_id = $4,
                used_at = $5,
                cancelled_at = $6,
                updated_at = $7
            WHERE id = $1 AND status = $2
            "#,
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(record.id().as_uuid())
            .bind(expected.as_str())
            .bind(record.status().as_str())
            .bind(record.entity_id().map(|id| id.as_i64()))
            .bind(record.used_at())
            .bind(record.cancelled_at())
            .bind(record.updated_at())
            .execute(tx.conn())
            .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("CodeRecord", record.code()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, %lot_id, burn = burn))]
    async fn cancel_reserved_in_lot(
        &self,
        tx: &mut TxContext,
        lot_id: &LotId,
        burn: bool,
        now: DateTime<Utc>,
    ) -> Result<u32, InfraError> {
        let target = if burn {
            CodeStatus::Burned
        } else {
            CodeStatus::Cancelled
        };
        let sql = format!(
            r#"
            UPDATE {} SET
                status = $2,
                cancelled_at = $3,
                updated_at = $3
            WHERE lot_id = $1 AND status = 'reserved'
            "#,
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(lot_id.as_uuid())
            .bind(target.as_str())
            .bind(now)
            .execute(tx.conn())
            .await?;

        u32::try_from(result.rows_affected())
            .map_err(|_| InfraError::unexpected("取消件数が範囲外です"))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, %lot_id))]
    async fn find_by_lot(&self, lot_id: &LotId) -> Result<Vec<CodeRecord>, InfraError> {
        let sql = format!("{} WHERE lot_id = $1 ORDER BY sequence, code", self.select());
        let rows = sqlx::query_as::<_, CodeRecordRow>(&sql)
            .bind(lot_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        self.into_records(rows)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(table = self.table, limit = limit))]
    async fn list_available(
        &self,
        lot_id: Option<&LotId>,
        limit: i64,
    ) -> Result<Vec<CodeRecord>, InfraError> {
        let mut builder = QueryBuilder::<Postgres>::new(self.select());
        builder.push(" WHERE status = 'reserved'");
        if let Some(lot_id) = lot_id {
            builder.push(" AND lot_id = ").push_bind(*lot_id.as_uuid());
        }
        builder
            .push(" ORDER BY sequence, code LIMIT ")
            .push_bind(limit);

        let rows = builder
            .build_query_as::<CodeRecordRow>()
            .fetch_all(&self.pool)
            .await?;

        self.into_records(rows)
    }
}

/// モジュール → コードリポジトリの対応表
///
/// 全モジュール分のリポジトリを必ず保持する。
#[derive(Clone)]
pub struct CodeRepositoryRegistry {
    member: Arc<dyn CodeRecordRepository>,
    game:   Arc<dyn CodeRecordRepository>,
    book:   Arc<dyn CodeRecordRepository>,
    film:   Arc<dyn CodeRecordRepository>,
    disc:   Arc<dyn CodeRecordRepository>,
}

impl CodeRepositoryRegistry {
    /// モジュールごとのリポジトリを生成して登録する
    pub fn new(mut factory: impl FnMut(BarcodeModule) -> Arc<dyn CodeRecordRepository>) -> Self {
        Self {
            member: factory(BarcodeModule::Member),
            game:   factory(BarcodeModule::Game),
            book:   factory(BarcodeModule::Book),
            film:   factory(BarcodeModule::Film),
            disc:   factory(BarcodeModule::Disc),
        }
    }

    /// PostgreSQL 実装で全モジュールを登録する
    pub fn postgres(pool: &PgPool) -> Self {
        Self::new(|module| Arc::new(PostgresCodeRecordRepository::new(pool.clone(), module)))
    }

    pub fn get(&self, module: BarcodeModule) -> &Arc<dyn CodeRecordRepository> {
        match module {
            BarcodeModule::Member => &self.member,
            BarcodeModule::Game => &self.game,
            BarcodeModule::Book => &self.book,
            BarcodeModule::Film => &self.film,
            BarcodeModule::Disc => &self.disc,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BarcodeModule::Member, "member_codes")]
    #[case(BarcodeModule::Game, "game_codes")]
    #[case(BarcodeModule::Book, "book_codes")]
    #[case(BarcodeModule::Film, "film_codes")]
    #[case(BarcodeModule::Disc, "disc_codes")]
    fn test_モジュールごとのテーブル名(#[case] module: BarcodeModule, #[case] table: &str) {
        assert_eq!(code_table(module), table);
    }
}
