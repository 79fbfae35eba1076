//! BarcodeUseCaseImpl 統合テスト（PostgreSQL）
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p ludo-core-service --test barcode_usecase_test -- --ignored
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ludo_core_service::{
    error::CoreError,
    usecase::{BarcodeUseCaseImpl, ReservationSettings, ReserveLotInput},
};
use ludo_domain::{
    DomainError,
    barcode::{BarcodeContext, BarcodeModule, FormatConfigPatch},
    clock::FixedClock,
};
use ludo_infra::{
    db::PgTransactionManager,
    repository::{
        CodeRepositoryRegistry,
        FormatConfigRepository,
        PostgresFormatConfigRepository,
        PostgresLotRepository,
    },
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap()
}

fn sut(pool: &PgPool) -> BarcodeUseCaseImpl {
    BarcodeUseCaseImpl::new(
        Arc::new(PostgresFormatConfigRepository::new(pool.clone())),
        Arc::new(PostgresLotRepository::new(pool.clone())),
        CodeRepositoryRegistry::postgres(pool),
        Arc::new(PgTransactionManager::new(pool.clone())),
        Arc::new(FixedClock::new(test_now())),
        ReservationSettings::default(),
    )
}

fn reserve_input(module: BarcodeModule, quantity: i64) -> ReserveLotInput {
    ReserveLotInput {
        module,
        quantity,
        context: BarcodeContext::global(),
        actor_id: None,
    }
}

async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// game_codes への INSERT を指定の SQLSTATE で失敗させるトリガーを仕掛ける
///
/// ロット行の INSERT は通り、コードの一括登録で失敗する状態を作る。
async fn reject_game_code_inserts(pool: &PgPool, sqlstate: &str) {
    sqlx::query(&format!(
        r#"
        CREATE FUNCTION reject_game_code_inserts() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'game_codes への登録を拒否' USING ERRCODE = '{sqlstate}';
        END;
        $$ LANGUAGE plpgsql
        "#
    ))
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_game_code_inserts BEFORE INSERT ON game_codes \
         FOR EACH STATEMENT EXECUTE FUNCTION reject_game_code_inserts()",
    )
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_reserve_lot_コード登録の失敗でロットも連番も残らない(pool: PgPool) {
    let sut = sut(&pool);
    let first = sut
        .reserve_lot(reserve_input(BarcodeModule::Game, 50))
        .await
        .unwrap();
    assert_eq!(first.lot.last_code(), "JEU00000050");

    reject_game_code_inserts(&pool, "P0001").await;
    let result = sut
        .reserve_lot(reserve_input(BarcodeModule::Game, 10))
        .await;

    assert!(matches!(result, Err(CoreError::Database(_))));
    assert_eq!(count_rows(&pool, "barcode_lots").await, 1);
    assert_eq!(count_rows(&pool, "game_codes").await, 50);
    let config = PostgresFormatConfigRepository::new(pool.clone())
        .find(BarcodeModule::Game, &BarcodeContext::global())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(config.current_sequence(), 50);
    assert!(config.is_locked());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_reserve_lot_初回予約が失敗すると書式もロックされない(pool: PgPool) {
    let sut = sut(&pool);
    let before = sut
        .get_config(BarcodeModule::Game, BarcodeContext::global())
        .await
        .unwrap();
    reject_game_code_inserts(&pool, "40001").await;

    let result = sut
        .reserve_lot(reserve_input(BarcodeModule::Game, 5))
        .await;

    // 直列化失敗はリトライされるが、毎回同じ箇所で失敗する
    match result {
        Err(CoreError::Database(e)) => assert!(e.is_retryable()),
        other => panic!("Database エラーを期待したが {other:?}"),
    }
    assert_eq!(count_rows(&pool, "barcode_lots").await, 0);
    assert_eq!(count_rows(&pool, "game_codes").await, 0);
    let after = sut
        .get_config(BarcodeModule::Game, BarcodeContext::global())
        .await
        .unwrap();
    assert_eq!(after, before);
    assert_eq!(after.current_sequence(), 0);
    assert!(!after.is_locked());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_update_config_同じプレフィックスの同時取得はひとつだけ成功する(pool: PgPool) {
    let game = sut(&pool);
    let disc = sut(&pool);
    let claim = || FormatConfigPatch {
        prefix: Some("MUS".to_string()),
        ..Default::default()
    };

    let (game_result, disc_result) = tokio::join!(
        game.update_config(BarcodeModule::Game, BarcodeContext::global(), claim()),
        disc.update_config(BarcodeModule::Disc, BarcodeContext::global(), claim()),
    );

    let rejected = [&game_result, &disc_result]
        .into_iter()
        .filter(|r| matches!(r, Err(CoreError::Domain(DomainError::Validation(_)))))
        .count();
    assert_eq!(rejected, 1);
    assert_eq!(
        [&game_result, &disc_result].into_iter().filter(|r| r.is_ok()).count(),
        1
    );
    let owners: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT module) FROM barcode_format_configs WHERE prefix = 'MUS'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(owners, 1);
}
