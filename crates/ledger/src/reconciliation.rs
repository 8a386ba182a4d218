//! Months-remaining derivation. Two strategies share one trait; the
//! deployment config picks which one runs.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use common::config::{InvalidDatePolicy, LedgerSettings, StrategyKind};
use common::types::{EntryType, Position, Record, StartDate};

use crate::ingestion::Column;

/// Inputs shared by every strategy for one refresh.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub today: NaiveDate,
    pub cycle_months: u32,
    pub invalid_date_policy: InvalidDatePolicy,
    payouts_by_name: HashMap<String, u32>,
}

impl ReconcileContext {
    pub fn new(today: NaiveDate, settings: &LedgerSettings, records: &[Record]) -> Self {
        let mut payouts_by_name: HashMap<String, u32> = HashMap::new();
        for record in records.iter().filter(|r| r.is_payout()) {
            *payouts_by_name.entry(record.name.clone()).or_default() += 1;
        }
        Self {
            today,
            cycle_months: settings.cycle_months,
            invalid_date_policy: settings.invalid_date_policy,
            payouts_by_name,
        }
    }

    /// Payout rows recorded against a normalized name.
    pub fn payouts_for(&self, name: &str) -> u32 {
        self.payouts_by_name.get(name).copied().unwrap_or(0)
    }

    /// `cycle - elapsed`, floored at zero.
    pub fn remaining_after(&self, months_elapsed: u32) -> u32 {
        self.cycle_months.saturating_sub(months_elapsed)
    }
}

pub trait ReconciliationStrategy {
    fn name(&self) -> &'static str;

    /// Columns ingestion must resolve for this strategy to work.
    fn required_columns(&self) -> &'static [Column];

    /// Whether the record opens a position (as opposed to being a transaction).
    fn is_position(&self, record: &Record) -> bool;

    fn months_elapsed(&self, record: &Record, ctx: &ReconcileContext) -> u32;

    fn months_remaining(&self, record: &Record, ctx: &ReconcileContext) -> u32 {
        ctx.remaining_after(self.months_elapsed(record, ctx))
    }
}

/// Counts `Payout` rows per investor. Every `Investment` row of an investor
/// shares the same count.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayoutCount;

impl ReconciliationStrategy for PayoutCount {
    fn name(&self) -> &'static str {
        StrategyKind::PayoutCount.as_str()
    }

    fn required_columns(&self) -> &'static [Column] {
        &[Column::Name, Column::Amount, Column::Type]
    }

    fn is_position(&self, record: &Record) -> bool {
        record.is_investment()
    }

    fn months_elapsed(&self, record: &Record, ctx: &ReconcileContext) -> u32 {
        ctx.payouts_for(&record.name)
    }
}

/// Whole calendar months between the start date and today; day-of-month ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calendar;

impl ReconciliationStrategy for Calendar {
    fn name(&self) -> &'static str {
        StrategyKind::Calendar.as_str()
    }

    fn required_columns(&self) -> &'static [Column] {
        &[Column::Name, Column::Amount, Column::Date]
    }

    fn is_position(&self, record: &Record) -> bool {
        matches!(record.entry_type, None | Some(EntryType::Investment))
    }

    fn months_elapsed(&self, record: &Record, ctx: &ReconcileContext) -> u32 {
        match &record.start_date {
            StartDate::Parsed(start) => calendar_months_between(*start, ctx.today),
            StartDate::Invalid(_) | StartDate::Missing => match ctx.invalid_date_policy {
                InvalidDatePolicy::Expired => ctx.cycle_months,
                InvalidDatePolicy::Fresh => 0,
            },
        }
    }
}

/// Month difference on year/month only. A start in the future counts as zero.
pub fn calendar_months_between(start: NaiveDate, today: NaiveDate) -> u32 {
    let diff = (today.year() - start.year()) * 12 + (today.month() as i32 - start.month() as i32);
    u32::try_from(diff).unwrap_or(0)
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn ReconciliationStrategy + Send + Sync> {
    match kind {
        StrategyKind::PayoutCount => Box::new(PayoutCount),
        StrategyKind::Calendar => Box::new(Calendar),
    }
}

/// Positions in source order, one per position-opening record.
pub fn reconcile(
    records: &[Record],
    strategy: &dyn ReconciliationStrategy,
    ctx: &ReconcileContext,
) -> Vec<Position> {
    records
        .iter()
        .filter(|r| strategy.is_position(r))
        .map(|r| {
            let months_elapsed = strategy.months_elapsed(r, ctx);
            Position {
                row: r.row,
                name: r.name.clone(),
                amount: r.amount,
                start_date: r.start_date.clone(),
                roi: r.roi,
                months_elapsed,
                months_remaining: ctx.remaining_after(months_elapsed),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Months;
    use rust_decimal::Decimal;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn record(row: usize, name: &str, entry: Option<EntryType>, start: StartDate) -> Record {
        Record {
            row,
            timestamp: None,
            name: name.to_string(),
            amount: Decimal::from(50_000),
            entry_type: entry,
            start_date: start,
            roi: None,
        }
    }

    fn started(months_ago: u32) -> StartDate {
        StartDate::Parsed(today().checked_sub_months(Months::new(months_ago)).unwrap())
    }

    fn ctx(settings: &LedgerSettings, records: &[Record]) -> ReconcileContext {
        ReconcileContext::new(today(), settings, records)
    }

    #[test]
    fn test_calendar_months_ignore_day_of_month() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(calendar_months_between(d(2026, 9, 30), d(2026, 10, 1)), 1);
        assert_eq!(calendar_months_between(d(2026, 10, 1), d(2026, 10, 31)), 0);
        assert_eq!(calendar_months_between(d(2025, 12, 31), d(2026, 1, 1)), 1);
        assert_eq!(calendar_months_between(d(2027, 1, 1), d(2026, 10, 18)), 0);
    }

    #[test]
    fn test_priya_six_months_in() {
        let settings = LedgerSettings::default();
        let records = vec![record(1, "Priya", None, started(6))];
        let c = ctx(&settings, &records);
        let positions = reconcile(&records, &Calendar, &c);
        assert_eq!(positions[0].months_elapsed, 6);
        assert_eq!(positions[0].months_remaining, 5);
        assert!(positions[0].is_active());
    }

    #[test]
    fn test_calendar_remaining_is_exact_and_decreasing_within_cycle() {
        let settings = LedgerSettings::default();
        let mut previous = u32::MAX;
        for elapsed in 0..=11 {
            let r = record(1, "Priya", None, started(elapsed));
            let c = ctx(&settings, std::slice::from_ref(&r));
            let remaining = Calendar.months_remaining(&r, &c);
            assert_eq!(remaining, 11 - elapsed);
            assert!(remaining < previous);
            previous = remaining;
        }
    }

    #[test]
    fn test_calendar_expired_after_full_cycle() {
        let settings = LedgerSettings::default();
        for elapsed in [12, 13, 24, 120] {
            let r = record(1, "Old", None, started(elapsed));
            let c = ctx(&settings, std::slice::from_ref(&r));
            assert_eq!(Calendar.months_remaining(&r, &c), 0, "elapsed {elapsed}");
        }
    }

    #[test]
    fn test_future_start_is_full_term() {
        let settings = LedgerSettings::default();
        for ahead in [1, 5, 30] {
            let start = today().checked_add_months(Months::new(ahead)).unwrap();
            let r = record(1, "Early", None, StartDate::Parsed(start));
            let c = ctx(&settings, std::slice::from_ref(&r));
            assert_eq!(Calendar.months_elapsed(&r, &c), 0);
            assert_eq!(Calendar.months_remaining(&r, &c), 11);
        }
    }

    #[test]
    fn test_invalid_date_policy() {
        let r = record(1, "Amit", None, StartDate::Invalid("not-a-date".to_string()));
        let missing = record(2, "Amit", None, StartDate::Missing);

        let expired = LedgerSettings::default();
        let c = ctx(&expired, &[]);
        assert_eq!(Calendar.months_remaining(&r, &c), 0);
        assert_eq!(Calendar.months_remaining(&missing, &c), 0);

        let fresh = LedgerSettings {
            invalid_date_policy: InvalidDatePolicy::Fresh,
            ..LedgerSettings::default()
        };
        let c = ctx(&fresh, &[]);
        assert_eq!(Calendar.months_remaining(&r, &c), 11);
    }

    #[test]
    fn test_calendar_skips_payout_rows() {
        let records = vec![
            record(1, "Rahul", Some(EntryType::Investment), started(2)),
            record(2, "Rahul", Some(EntryType::Payout), started(1)),
            record(3, "Priya", None, started(3)),
            record(4, "Priya", Some(EntryType::Other("Refund".to_string())), started(3)),
        ];
        let settings = LedgerSettings::default();
        let positions = reconcile(&records, &Calendar, &ctx(&settings, &records));
        let rows: Vec<usize> = positions.iter().map(|p| p.row).collect();
        assert_eq!(rows, vec![1, 3]);
    }

    #[test]
    fn test_rahul_two_payouts() {
        let records = vec![
            record(1, "Rahul", Some(EntryType::Investment), StartDate::Missing),
            record(2, "Rahul", Some(EntryType::Payout), StartDate::Missing),
            record(3, "Priya", Some(EntryType::Payout), StartDate::Missing),
            record(4, "Rahul", Some(EntryType::Payout), StartDate::Missing),
        ];
        let settings = LedgerSettings::default();
        let positions = reconcile(&records, &PayoutCount, &ctx(&settings, &records));
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].name, "Rahul");
        assert_eq!(positions[0].months_elapsed, 2);
        assert_eq!(positions[0].months_remaining, 9);
        assert!(positions[0].is_active());
    }

    #[test]
    fn test_payout_count_shared_across_investments_and_floored() {
        let mut records = vec![
            record(1, "Rahul", Some(EntryType::Investment), StartDate::Missing),
            record(2, "Rahul", Some(EntryType::Investment), StartDate::Missing),
        ];
        for row in 3..16 {
            records.push(record(row, "Rahul", Some(EntryType::Payout), StartDate::Missing));
        }
        let settings = LedgerSettings::default();
        let positions = reconcile(&records, &PayoutCount, &ctx(&settings, &records));
        assert_eq!(positions.len(), 2);
        assert!(positions.iter().all(|p| p.months_elapsed == 13));
        assert!(positions.iter().all(|p| p.months_remaining == 0));
    }

    #[test]
    fn test_cycle_length_comes_from_settings() {
        let settings = LedgerSettings {
            cycle_months: 6,
            ..LedgerSettings::default()
        };
        let r = record(1, "Priya", None, started(2));
        let c = ctx(&settings, std::slice::from_ref(&r));
        assert_eq!(Calendar.months_remaining(&r, &c), 4);

        let fresh = LedgerSettings {
            invalid_date_policy: InvalidDatePolicy::Fresh,
            ..settings
        };
        let bad = record(2, "Amit", None, StartDate::Missing);
        assert_eq!(Calendar.months_remaining(&bad, &ctx(&fresh, &[])), 6);
    }

    #[test]
    fn test_strategy_for_selects_by_kind() {
        assert_eq!(strategy_for(StrategyKind::Calendar).name(), "calendar");
        assert_eq!(strategy_for(StrategyKind::PayoutCount).name(), "payout_count");
        assert!(strategy_for(StrategyKind::PayoutCount)
            .required_columns()
            .contains(&Column::Type));
    }
}
