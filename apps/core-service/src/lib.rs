//! # Core Service ライブラリ
//!
//! 採番サービスの設定・エラー・ユースケースを公開する。
//! HTTP などの入口はこのクレートの外に置き、ここでは扱わない。

pub mod config;
pub mod error;
pub mod usecase;
