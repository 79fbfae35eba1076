//! # Core Service ブートストラップ
//!
//! 採番エンジンを PostgreSQL に接続して起動可能な状態にする。
//!
//! ## 役割
//!
//! - 環境変数（`.env` があれば読み込む）から設定を組み立てる
//! - トレーシングを初期化する
//! - 接続プールを作成し、マイグレーションを適用する
//! - 全モジュールのグローバル書式設定を用意し、次に発行されるコードをログに出す
//!
//! HTTP などの入口は持たない。ユースケースは [`ludo_core_service::usecase`]
//! をライブラリとして組み込んで使う。
//!
//! ## 起動方法
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo run -p ludo-core-service
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use ludo_core_service::{
    config::ServiceConfig,
    usecase::{BarcodeUseCaseImpl, ReservationSettings},
};
use ludo_domain::{
    barcode::{BarcodeContext, BarcodeModule},
    clock::SystemClock,
};
use ludo_infra::{
    db::{self, PgTransactionManager},
    repository::{CodeRepositoryRegistry, PostgresFormatConfigRepository, PostgresLotRepository},
};
use ludo_shared::observability::init_tracing;
use strum::IntoEnumIterator;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().context("設定の読み込みに失敗しました")?;
    let span = init_tracing(&config.tracing);

    run(config).instrument(span).await
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    tracing::info!(
        max_connections = config.database_max_connections,
        reserve_max_attempts = config.reserve_max_attempts,
        collision_budget = config.collision_budget,
        "採番サービスを起動します"
    );

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("データベース接続に失敗しました")?;
    tracing::info!("データベースに接続しました");

    db::run_migrations(&pool)
        .await
        .context("マイグレーションの適用に失敗しました")?;
    tracing::info!("マイグレーションを適用しました");

    let usecase = BarcodeUseCaseImpl::new(
        Arc::new(PostgresFormatConfigRepository::new(pool.clone())),
        Arc::new(PostgresLotRepository::new(pool.clone())),
        CodeRepositoryRegistry::postgres(&pool),
        Arc::new(PgTransactionManager::new(pool.clone())),
        Arc::new(SystemClock),
        ReservationSettings::from(&config),
    );

    for module in BarcodeModule::iter() {
        let format = usecase
            .get_config(module, BarcodeContext::global())
            .await
            .with_context(|| format!("{module} の書式設定を用意できません"))?;
        let preview = usecase
            .preview_next_code(module, BarcodeContext::global())
            .await
            .with_context(|| format!("{module} の次コードを計算できません"))?;

        tracing::info!(
            barcode.module = %module,
            barcode.prefix = format.prefix(),
            barcode.pattern = format.pattern(),
            barcode.current_sequence = format.current_sequence(),
            barcode.locked = format.is_locked(),
            barcode.next_code = %preview.code,
            "書式設定を確認"
        );
    }

    tracing::info!("採番エンジンの準備が完了しました");
    Ok(())
}
