//! CodeRecordRepository / LotRepository 統合テスト
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p ludo-infra --test code_record_repository_test -- --ignored
//! ```

mod common;

use common::{create_test_lot, test_now};
use ludo_domain::{
    barcode::{BarcodeModule, CodeRecord, CodeRef, CodeStatus, LotStatus},
    value_objects::EntityId,
};
use ludo_infra::{
    InfraErrorKind,
    db::{PgTransactionManager, TransactionManager},
    repository::{
        CodeRecordRepository,
        CodeRepositoryRegistry,
        LotQuery,
        LotRepository,
        PostgresLotRepository,
    },
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_ロットとコードを一括登録して取得できる(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let lots = PostgresLotRepository::new(pool.clone());
    let registry = CodeRepositoryRegistry::postgres(&pool);
    let codes_repo = registry.get(BarcodeModule::Game);
    let (lot, codes) = create_test_lot(BarcodeModule::Game, 5);

    let mut tx = tx_manager.begin().await.unwrap();
    lots.insert(&mut tx, &lot).await.unwrap();
    codes_repo.insert_many(&mut tx, &codes).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(lots.find_by_id(lot.id()).await.unwrap(), Some(lot.clone()));
    assert_eq!(codes_repo.find_by_lot(lot.id()).await.unwrap(), codes);

    let available = codes_repo.list_available(Some(lot.id()), 2).await.unwrap();
    assert_eq!(available, codes[..2].to_vec());

    let listed = lots
        .list(&LotQuery {
            module: Some(BarcodeModule::Game),
            status: Some(LotStatus::Active),
            limit:  10,
        })
        .await
        .unwrap();
    assert_eq!(listed, vec![lot]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_既存コードを検出できる(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let lots = PostgresLotRepository::new(pool.clone());
    let registry = CodeRepositoryRegistry::postgres(&pool);
    let codes_repo = registry.get(BarcodeModule::Book);
    let (lot, codes) = create_test_lot(BarcodeModule::Book, 3);

    let mut tx = tx_manager.begin().await.unwrap();
    lots.insert(&mut tx, &lot).await.unwrap();
    codes_repo.insert_many(&mut tx, &codes).await.unwrap();

    let existing = codes_repo
        .find_existing_codes(
            &mut tx,
            &["LIV00000002".to_string(), "LIV00000009".to_string()],
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(existing, vec!["LIV00000002".to_string()]);
    // モジュールごとにテーブルが分かれている
    assert_eq!(
        registry
            .get(BarcodeModule::Game)
            .find_by_code("LIV00000002")
            .await
            .unwrap(),
        None
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_重複コードの登録はリトライ可能なエラー(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let registry = CodeRepositoryRegistry::postgres(&pool);
    let codes_repo = registry.get(BarcodeModule::Member);
    let entity = EntityId::new(7).unwrap();
    let first = CodeRecord::ad_hoc_used(
        BarcodeModule::Member,
        "USA00000007".to_string(),
        entity,
        test_now(),
    );
    let duplicate = CodeRecord::ad_hoc_used(
        BarcodeModule::Member,
        "USA00000007".to_string(),
        entity,
        test_now(),
    );

    let mut tx = tx_manager.begin().await.unwrap();
    codes_repo.insert(&mut tx, &first).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = tx_manager.begin().await.unwrap();
    let err = codes_repo.insert(&mut tx, &duplicate).await.unwrap_err();

    assert!(matches!(err.kind(), InfraErrorKind::Database(_)));
    assert_eq!(err.sqlstate().as_deref(), Some("23505"));
    assert!(err.is_retryable());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_ステータスが変わっていれば更新はconflict(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let lots = PostgresLotRepository::new(pool.clone());
    let registry = CodeRepositoryRegistry::postgres(&pool);
    let codes_repo = registry.get(BarcodeModule::Disc);
    let (lot, codes) = create_test_lot(BarcodeModule::Disc, 1);
    let now = test_now();

    let mut tx = tx_manager.begin().await.unwrap();
    lots.insert(&mut tx, &lot).await.unwrap();
    codes_repo.insert_many(&mut tx, &codes).await.unwrap();
    tx.commit().await.unwrap();

    let used = codes[0]
        .clone()
        .assigned(EntityId::new(1).unwrap(), now)
        .unwrap();
    let mut tx = tx_manager.begin().await.unwrap();
    codes_repo
        .update(&mut tx, &used, CodeStatus::Reserved)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // 古い前提（reserved）での 2 回目の更新
    let cancelled = codes[0].clone().cancelled(false, now).unwrap();
    let mut tx = tx_manager.begin().await.unwrap();
    let err = codes_repo
        .update(&mut tx, &cancelled, CodeStatus::Reserved)
        .await
        .unwrap_err();

    assert!(err.as_conflict().is_some());
    let stored = codes_repo
        .find_by_code(codes[0].code())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), CodeStatus::Used);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_ロット内の予約済みコードだけを一括取消する(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let lots = PostgresLotRepository::new(pool.clone());
    let registry = CodeRepositoryRegistry::postgres(&pool);
    let codes_repo = registry.get(BarcodeModule::Game);
    let (lot, codes) = create_test_lot(BarcodeModule::Game, 4);
    let now = test_now();

    let mut tx = tx_manager.begin().await.unwrap();
    lots.insert(&mut tx, &lot).await.unwrap();
    codes_repo.insert_many(&mut tx, &codes).await.unwrap();
    let used = codes[0]
        .clone()
        .assigned(EntityId::new(1).unwrap(), now)
        .unwrap();
    codes_repo
        .update(&mut tx, &used, CodeStatus::Reserved)
        .await
        .unwrap();

    let locked = codes_repo
        .find_for_update(&mut tx, &CodeRef::Id(codes[1].id().clone()))
        .await
        .unwrap();
    assert_eq!(locked.map(|r| r.status()), Some(CodeStatus::Reserved));

    let count = codes_repo
        .cancel_reserved_in_lot(&mut tx, lot.id(), true, now)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(count, 3);
    let statuses: Vec<CodeStatus> = codes_repo
        .find_by_lot(lot.id())
        .await
        .unwrap()
        .iter()
        .map(|r| r.status())
        .collect();
    assert_eq!(
        statuses,
        [
            CodeStatus::Used,
            CodeStatus::Burned,
            CodeStatus::Burned,
            CodeStatus::Burned
        ]
    );
}
