//! # LotRepository
//!
//! ロット（一括予約）の永続化を担当するリポジトリ。
//!
//! カウンター（`used_count` / `cancelled_count`）はユースケース層が
//! コードの状態遷移と同じトランザクションで更新する。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ludo_domain::{
    barcode::{BarcodeContext, BarcodeModule, Lot, LotData, LotId, LotStatus},
    value_objects::ActorId,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// ロット一覧の絞り込み条件
#[derive(Debug, Clone, Default)]
pub struct LotQuery {
    pub module: Option<BarcodeModule>,
    pub status: Option<LotStatus>,
    pub limit:  i64,
}

/// ロットリポジトリトレイト
#[async_trait]
pub trait LotRepository: Send + Sync {
    /// 新規ロットを作成する
    async fn insert(&self, tx: &mut TxContext, lot: &Lot) -> Result<(), InfraError>;

    /// ロットを更新する（ステータス・カウンター・印刷情報）
    async fn update(&self, tx: &mut TxContext, lot: &Lot) -> Result<(), InfraError>;

    /// ID でロットを取得する（ロックなし）
    async fn find_by_id(&self, id: &LotId) -> Result<Option<Lot>, InfraError>;

    /// ID でロットを取得し、行ロックを取る
    async fn find_for_update(
        &self,
        tx: &mut TxContext,
        id: &LotId,
    ) -> Result<Option<Lot>, InfraError>;

    /// ロット一覧を新しい順に取得する
    async fn list(&self, query: &LotQuery) -> Result<Vec<Lot>, InfraError>;
}

/// DB の barcode_lots テーブルの行を表す中間構造体
#[derive(sqlx::FromRow)]
struct LotRow {
    id: Uuid,
    module: String,
    organisation_id: Option<i64>,
    structure_id: Option<i64>,
    group_id: Option<i64>,
    quantity: i32,
    first_code: String,
    last_code: String,
    status: String,
    used_count: i32,
    cancelled_count: i32,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    printed_at: Option<DateTime<Utc>>,
    reprint_count: i32,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

fn to_u32(value: i32, column: &str) -> Result<u32, InfraError> {
    u32::try_from(value)
        .map_err(|_| InfraError::unexpected(format!("{column} が負の値です: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32, InfraError> {
    i32::try_from(value)
        .map_err(|_| InfraError::unexpected(format!("{column} が範囲外です: {value}")))
}

impl TryFrom<LotRow> for Lot {
    type Error = InfraError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        Ok(Lot::from_db(LotData {
            id: LotId::from_uuid(row.id),
            module: row
                .module
                .parse::<BarcodeModule>()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
            context: BarcodeContext::new(row.organisation_id, row.structure_id, row.group_id),
            quantity: to_u32(row.quantity, "quantity")?,
            first_code: row.first_code,
            last_code: row.last_code,
            status: row
                .status
                .parse::<LotStatus>()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
            used_count: to_u32(row.used_count, "used_count")?,
            cancelled_count: to_u32(row.cancelled_count, "cancelled_count")?,
            created_by: row.created_by.map(ActorId::from_uuid),
            created_at: row.created_at,
            printed_at: row.printed_at,
            reprint_count: to_u32(row.reprint_count, "reprint_count")?,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            updated_at: row.updated_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, module, organisation_id, structure_id, group_id,
        quantity, first_code, last_code, status,
        used_count, cancelled_count, created_by, created_at,
        printed_at, reprint_count, completed_at, cancelled_at, updated_at
    FROM barcode_lots
"#;

/// PostgreSQL 実装の LotRepository
#[derive(Debug, Clone)]
pub struct PostgresLotRepository {
    pool: PgPool,
}

impl PostgresLotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LotRepository for PostgresLotRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %lot.id()))]
    async fn insert(&self, tx: &mut TxContext, lot: &Lot) -> Result<(), InfraError> {
        let context = lot.context();
        let status: &str = lot.status().into();
        sqlx::query(
            r#"
            INSERT INTO barcode_lots (
                id, module, organisation_id, structure_id, group_id,
                quantity, first_code, last_code, status,
                used_count, cancelled_count, created_by, created_at,
                printed_at, reprint_count, completed_at, cancelled_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(lot.id().as_uuid())
        .bind(lot.module().as_str())
        .bind(context.organisation_id)
        .bind(context.structure_id)
        .bind(context.group_id)
        .bind(to_i32(lot.quantity(), "quantity")?)
        .bind(lot.first_code())
        .bind(lot.last_code())
        .bind(status)
        .bind(to_i32(lot.used_count(), "used_count")?)
        .bind(to_i32(lot.cancelled_count(), "cancelled_count")?)
        .bind(lot.created_by().map(|a| *a.as_uuid()))
        .bind(lot.created_at())
        .bind(lot.printed_at())
        .bind(to_i32(lot.reprint_count(), "reprint_count")?)
        .bind(lot.completed_at())
        .bind(lot.cancelled_at())
        .bind(lot.updated_at())
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %lot.id()))]
    async fn update(&self, tx: &mut TxContext, lot: &Lot) -> Result<(), InfraError> {
        let status: &str = lot.status().into();
        let result = sqlx::query(
            r#"
            UPDATE barcode_lots SET
                status = $2,
                used_count = $3,
                cancelled_count = $4,
                printed_at = $5,
                reprint_count = $6,
                completed_at = $7,
                cancelled_at = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(lot.id().as_uuid())
        .bind(status)
        .bind(to_i32(lot.used_count(), "used_count")?)
        .bind(to_i32(lot.cancelled_count(), "cancelled_count")?)
        .bind(lot.printed_at())
        .bind(to_i32(lot.reprint_count(), "reprint_count")?)
        .bind(lot.completed_at())
        .bind(lot.cancelled_at())
        .bind(lot.updated_at())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("Lot", lot.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &LotId) -> Result<Option<Lot>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = sqlx::query_as::<_, LotRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Lot::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_for_update(
        &self,
        tx: &mut TxContext,
        id: &LotId,
    ) -> Result<Option<Lot>, InfraError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, LotRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(tx.conn())
            .await?;

        row.map(Lot::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn list(&self, query: &LotQuery) -> Result<Vec<Lot>, InfraError> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        builder.push(" WHERE TRUE");
        if let Some(module) = query.module {
            builder.push(" AND module = ").push_bind(module.as_str());
        }
        if let Some(status) = query.status {
            let status: &str = status.into();
            builder.push(" AND status = ").push_bind(status);
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit);

        let rows = builder
            .build_query_as::<LotRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Lot::try_from).collect()
    }
}
