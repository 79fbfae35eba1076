//! # 連番アロケーター
//!
//! 書式設定の `current_sequence + 1` から候補コードを順に生成し、
//! 既存コードと衝突するものを飛ばして空き連番を集める純粋ロジック。
//!
//! ストレージへの問い合わせは呼び出し側の責務。
//! [`SequenceProbe`] を使うと、候補をウィンドウ単位でまとめて
//! 既存チェックに渡せる（1 ウィンドウにつき 1 クエリ）。
//!
//! ```rust
//! use chrono::{NaiveDate, TimeZone, Utc};
//! use ludo_domain::barcode::{
//!     BarcodeContext, BarcodeModule, FormatConfig, SequenceAllocator,
//! };
//!
//! let now = Utc.with_ymd_and_hms(2026, 3, 7, 0, 0, 0).unwrap();
//! let config = FormatConfig::with_defaults(BarcodeModule::Game, BarcodeContext::global(), now);
//! let allocator = SequenceAllocator::new(&config, now.date_naive());
//!
//! // JEU00000002 は既に使われている
//! let allocation = allocator
//!     .collect_available(3, |code| code == "JEU00000002")
//!     .unwrap();
//! let codes: Vec<_> = allocation.codes.iter().map(|c| c.code.as_str()).collect();
//! assert_eq!(codes, ["JEU00000001", "JEU00000003", "JEU00000004"]);
//! assert_eq!(allocation.skipped, 1);
//! ```

use std::collections::HashSet;

use chrono::NaiveDate;

use super::{BarcodeModule, FormatConfig, pattern};
use crate::DomainError;

/// 1 回の割り当てでスキップできる衝突の既定上限
pub const DEFAULT_COLLISION_BUDGET: usize = 10_000;

/// 連番とそのレンダリング結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub sequence: i64,
    pub code:     String,
}

/// 空き連番を探すアロケーター
///
/// 書式設定のスナップショット（期間リセット適用後）から作る。
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    module: BarcodeModule,
    pattern: String,
    prefix: String,
    date: NaiveDate,
    start: i64,
    collision_budget: usize,
}

impl SequenceAllocator {
    pub fn new(config: &FormatConfig, date: NaiveDate) -> Self {
        Self {
            module: config.module(),
            pattern: config.pattern().to_string(),
            prefix: config.prefix().to_string(),
            date,
            start: config.next_sequence(),
            collision_budget: DEFAULT_COLLISION_BUDGET,
        }
    }

    pub fn with_collision_budget(self, collision_budget: usize) -> Self {
        Self {
            collision_budget,
            ..self
        }
    }

    /// 最初に試す連番
    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn render(&self, sequence: i64) -> String {
        pattern::render(&self.pattern, sequence, &self.prefix, self.date)
    }

    /// `from` から最大 `count` 件の候補を生成する
    ///
    /// `i64` の上限を超える連番は生成しない。
    pub fn candidates(&self, from: i64, count: usize) -> Vec<Candidate> {
        (0..count as i64)
            .map_while(|offset| from.checked_add(offset))
            .map(|sequence| Candidate {
                sequence,
                code: self.render(sequence),
            })
            .collect()
    }

    /// 最初の空き連番を探す
    pub fn find_next_available(
        &self,
        is_taken: impl FnMut(&str) -> bool,
    ) -> Result<Candidate, DomainError> {
        let mut allocation = self.collect_available(1, is_taken)?;
        allocation.codes.pop().ok_or(DomainError::SequenceExhausted {
            module:        self.module,
            skipped:       allocation.skipped,
            last_sequence: self.start,
        })
    }

    /// ウィンドウ単位の探索を開始する
    pub fn probe(&self, quantity: usize) -> SequenceProbe<'_> {
        SequenceProbe {
            allocator: self,
            quantity,
            next: Some(self.start),
            accepted: Vec::with_capacity(quantity),
            seen: HashSet::with_capacity(quantity),
            skipped: 0,
        }
    }

    /// `quantity` 件の空き連番を集める
    pub fn collect_available(
        &self,
        quantity: usize,
        mut is_taken: impl FnMut(&str) -> bool,
    ) -> Result<Allocation, DomainError> {
        let mut probe = self.probe(quantity);
        while !probe.is_complete() {
            let window = probe.window();
            probe.absorb(window, &mut is_taken)?;
        }
        probe.finish()
    }
}

/// ウィンドウ単位の空き連番探索
///
/// ```text
/// while !probe.is_complete() {
///     let window = probe.window();           // 不足分の候補
///     let taken  = storage.existing(&window); // まとめて既存チェック
///     probe.absorb(window, |c| taken.contains(c))?;
/// }
/// let allocation = probe.finish()?;
/// ```
#[derive(Debug)]
pub struct SequenceProbe<'a> {
    allocator: &'a SequenceAllocator,
    quantity:  usize,
    next:      Option<i64>,
    accepted:  Vec<Candidate>,
    seen:      HashSet<String>,
    skipped:   usize,
}

impl SequenceProbe<'_> {
    pub fn is_complete(&self) -> bool {
        self.accepted.len() >= self.quantity
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// 次に確認すべき候補（不足している件数分）
    pub fn window(&self) -> Vec<Candidate> {
        match self.next {
            Some(next) if !self.is_complete() => self
                .allocator
                .candidates(next, self.quantity - self.accepted.len()),
            _ => Vec::new(),
        }
    }

    /// 確認結果を取り込む
    ///
    /// 使用済みの候補はスキップとして数え、上限を超えたら
    /// [`DomainError::SequenceExhausted`] を返す。
    pub fn absorb(
        &mut self,
        window: Vec<Candidate>,
        mut is_taken: impl FnMut(&str) -> bool,
    ) -> Result<(), DomainError> {
        if window.is_empty() && !self.is_complete() {
            return Err(self.exhausted(self.next.unwrap_or(i64::MAX)));
        }

        for candidate in window {
            if self.is_complete() {
                break;
            }
            self.next = candidate.sequence.checked_add(1);

            if self.seen.contains(&candidate.code) || is_taken(&candidate.code) {
                self.skipped += 1;
                if self.skipped > self.allocator.collision_budget {
                    return Err(self.exhausted(candidate.sequence));
                }
                continue;
            }

            self.seen.insert(candidate.code.clone());
            self.accepted.push(candidate);
        }
        Ok(())
    }

    /// 探索結果を確定する
    pub fn finish(self) -> Result<Allocation, DomainError> {
        if !self.is_complete() {
            let last = self.next.unwrap_or(i64::MAX);
            return Err(self.exhausted(last));
        }
        Ok(Allocation {
            codes:   self.accepted,
            skipped: self.skipped,
        })
    }

    fn exhausted(&self, last_sequence: i64) -> DomainError {
        DomainError::SequenceExhausted {
            module: self.allocator.module,
            skipped: self.skipped,
            last_sequence,
        }
    }
}

/// 割り当て結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// 連番の昇順
    pub codes:   Vec<Candidate>,
    pub skipped: usize,
}

impl Allocation {
    pub fn first(&self) -> Option<&Candidate> {
        self.codes.first()
    }

    pub fn last(&self) -> Option<&Candidate> {
        self.codes.last()
    }

    /// 書式設定に記録する最終連番
    pub fn last_sequence(&self) -> Option<i64> {
        self.last().map(|c| c.sequence)
    }
}
