//! # Ludo 共有ユーティリティ
//!
//! ドメイン・インフラ・サービスの各クレートから依存される共通ユーティリティ。
//!
//! ## 設計方針
//!
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - 外部クレートへの依存は最小限に抑え、tracing 系は `observability` feature の背後に置く

pub mod event_log;
pub mod observability;
