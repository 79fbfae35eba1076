//! LotRepository 統合テスト
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p ludo-infra --test lot_repository_test -- --ignored
//! ```

mod common;

use chrono::Duration;
use ludo_domain::barcode::{BarcodeModule, LotId, LotStatus};
use ludo_infra::{
    db::{PgTransactionManager, TransactionManager},
    repository::{LotQuery, LotRepository, PostgresLotRepository},
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_作成したロットを取得できる(pool: PgPool) {
    let repo = PostgresLotRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());
    let (lot, _) = common::create_test_lot(BarcodeModule::Game, 50);

    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &lot).await.unwrap();
    tx.commit().await.unwrap();

    let found = repo.find_by_id(lot.id()).await.unwrap();
    assert_eq!(found, Some(lot));
    assert_eq!(repo.find_by_id(&LotId::new()).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_カウンターと印刷情報を更新できる(pool: PgPool) {
    let repo = PostgresLotRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());
    let (lot, _) = common::create_test_lot(BarcodeModule::Book, 2);
    let now = common::test_now();

    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &lot).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = tx_manager.begin().await.unwrap();
    let locked = repo.find_for_update(&mut tx, lot.id()).await.unwrap().unwrap();
    let updated = locked
        .record_use(now)
        .unwrap()
        .record_use(now + Duration::minutes(1))
        .unwrap()
        .printed(now);
    repo.update(&mut tx, &updated).await.unwrap();
    tx.commit().await.unwrap();

    let found = repo.find_by_id(lot.id()).await.unwrap().unwrap();
    assert_eq!(found.used_count(), 2);
    assert!(found.is_complete());
    assert_eq!(found.completed_at(), Some(now + Duration::minutes(1)));
    assert_eq!(found.printed_at(), Some(now));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_一覧はモジュールとステータスで絞り込める(pool: PgPool) {
    let repo = PostgresLotRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());
    let (game, _) = common::create_test_lot(BarcodeModule::Game, 3);
    let (book, _) = common::create_test_lot(BarcodeModule::Book, 3);
    let now = common::test_now();

    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &game).await.unwrap();
    repo.insert(&mut tx, &book).await.unwrap();
    let cancelled = book.cancelled(3, now).unwrap();
    repo.update(&mut tx, &cancelled).await.unwrap();
    tx.commit().await.unwrap();

    let games = repo
        .list(&LotQuery {
            module: Some(BarcodeModule::Game),
            status: None,
            limit:  10,
        })
        .await
        .unwrap();
    assert_eq!(games, vec![game]);

    let cancelled_lots = repo
        .list(&LotQuery {
            module: None,
            status: Some(LotStatus::Cancelled),
            limit:  10,
        })
        .await
        .unwrap();
    assert_eq!(cancelled_lots.len(), 1);
    assert_eq!(cancelled_lots[0].id(), cancelled.id());
    assert_eq!(cancelled_lots[0].cancelled_count(), 3);
}
