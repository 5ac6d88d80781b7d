//! Energy counters and power estimation.
//!
//! The adapters only expose cumulative daily energy. Power is derived from
//! the slope of those counters: when 100 Wh took ten minutes, the next
//! 100 Wh are assumed to take about as long, plus a margin.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, trace};

use crate::flat::FieldMap;
use crate::types::{EnergyMode, EnergyPeriod};

pub const MAX_HISTORY_HOURS: i64 = 6;
pub const DEFAULT_MIN_POWER: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
enum Reducer {
    Last,
    SecondLast,
    Sum,
}

struct CounterParser {
    field: &'static str,
    reducer: Reducer,
    divider: f64,
}

fn parser(mode: EnergyMode, period: EnergyPeriod) -> Option<CounterParser> {
    use EnergyMode::*;
    use EnergyPeriod::*;
    let (field, reducer, divider) = match (mode, period) {
        (Total, Today) => ("datas", Reducer::Last, 1000.0),
        (Total, Yesterday) => ("datas", Reducer::SecondLast, 1000.0),
        (Total, Last7Days) => ("datas", Reducer::Sum, 1000.0),
        (Total, ThisYear) => ("this_year", Reducer::Sum, 1.0),
        (Total, LastYear) => ("previous_year", Reducer::Sum, 1.0),
        (Cool, Today) => ("curr_day_cool", Reducer::Sum, 10.0),
        (Cool, Yesterday) => ("prev_1day_cool", Reducer::Sum, 10.0),
        (Heat, Today) => ("curr_day_heat", Reducer::Sum, 10.0),
        (Heat, Yesterday) => ("prev_1day_heat", Reducer::Sum, 10.0),
        _ => return None,
    };
    Some(CounterParser { field, reducer, divider })
}

/// Field holding the counter for `mode`/`period`, if the pair exists at all.
pub fn counter_field(mode: EnergyMode, period: EnergyPeriod) -> Option<&'static str> {
    parser(mode, period).map(|p| p.field)
}

/// Decodes a `/`-separated counter list into kWh. `None` when the pair is
/// not reported or the field is missing or garbled.
pub fn parse_counter(raw: &str, mode: EnergyMode, period: EnergyPeriod) -> Option<f64> {
    let parser = parser(mode, period)?;
    let values = raw
        .split('/')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let reduced = match parser.reducer {
        Reducer::Last => *values.last()?,
        Reducer::SecondLast => *values.iter().rev().nth(1)?,
        Reducer::Sum => values.iter().sum(),
    };
    Some(reduced as f64 / parser.divider)
}

pub fn counter(values: &FieldMap, mode: EnergyMode, period: EnergyPeriod) -> Option<f64> {
    let field = counter_field(mode, period)?;
    parse_counter(values.get(field)?, mode, period)
}

/// Yearly counters only move monthly, so the last week is included to catch
/// units with recent activity.
pub fn supports_energy(values: &FieldMap) -> bool {
    let total = [EnergyPeriod::ThisYear, EnergyPeriod::LastYear, EnergyPeriod::Last7Days]
        .into_iter()
        .filter_map(|period| counter(values, EnergyMode::Total, period))
        .sum::<f64>();
    total > 0.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnergySample {
    pub at: DateTime<Utc>,
    /// First sample of a fresh history; its timestamp says nothing about
    /// when the energy was consumed.
    pub first: bool,
    pub today: f64,
    pub yesterday: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Margin {
    /// Added to the expected interval after each estimate.
    Duration(TimeDelta),
    /// Expected interval is scaled by `1 + factor`.
    Factor(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerEstimate {
    /// Fixed expected interval between counter updates. When unset, the
    /// observed gap between samples is used.
    pub window: Option<TimeDelta>,
    pub margin: Margin,
    pub min_power: f64,
}

impl Default for PowerEstimate {
    fn default() -> Self {
        Self {
            window: None,
            margin: Margin::Duration(TimeDelta::minutes(5)),
            min_power: DEFAULT_MIN_POWER,
        }
    }
}

impl PowerEstimate {
    /// Current total draw, tolerating a 50% late counter update.
    pub fn total() -> Self {
        Self {
            margin: Margin::Factor(0.5),
            ..Self::default()
        }
    }

    /// Average over the last hour with a five minute margin.
    pub fn last_hour() -> Self {
        Self {
            window: Some(TimeDelta::minutes(60)),
            margin: Margin::Duration(TimeDelta::minutes(5)),
            min_power: DEFAULT_MIN_POWER,
        }
    }
}

fn hours(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 3_600_000.0
}

/// Energy consumed between two samples, bridging a midnight rollover.
pub fn compute_diff(mode: EnergyMode, curr: &EnergySample, prev: &EnergySample) -> Option<f64> {
    if curr.today > prev.today {
        return Some(curr.today - prev.today);
    }
    let Some(yesterday) = curr.yesterday else {
        error!(
            mode = mode.as_str(),
            "decreasing today counter without a yesterday counter, impossible energy measure"
        );
        return None;
    };
    if yesterday >= prev.today {
        return Some(yesterday - prev.today + curr.today);
    }
    error!(mode = mode.as_str(), yesterday, previous_today = prev.today, "impossible energy measure");
    None
}

#[derive(Debug, Clone)]
pub struct EnergyEstimator {
    /// Newest first.
    history: HashMap<EnergyMode, Vec<EnergySample>>,
    max_history: TimeDelta,
}

impl Default for EnergyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergyEstimator {
    pub fn new() -> Self {
        Self {
            history: HashMap::new(),
            max_history: TimeDelta::hours(MAX_HISTORY_HOURS),
        }
    }

    pub fn history(&self, mode: EnergyMode) -> &[EnergySample] {
        self.history.get(&mode).map(Vec::as_slice).unwrap_or_default()
    }

    /// Records one sample per mode from freshly refreshed counters. Modes
    /// whose today counter is missing or garbled are skipped; unchanged
    /// counters add nothing.
    pub fn record(&mut self, values: &FieldMap, now: DateTime<Utc>) {
        for mode in EnergyMode::ALL {
            let Some(today) = counter(values, mode, EnergyPeriod::Today) else {
                continue;
            };
            let yesterday = counter(values, mode, EnergyPeriod::Yesterday);
            self.push(mode, today, yesterday, now);
        }
    }

    pub fn push(&mut self, mode: EnergyMode, today: f64, yesterday: Option<f64>, now: DateTime<Utc>) {
        let history = self.history.entry(mode).or_default();
        if let Some(latest) = history.first()
            && latest.today == today
            && latest.yesterday == yesterday
        {
            return;
        }
        let first = history.is_empty();
        history.insert(
            0,
            EnergySample {
                at: now,
                first,
                today,
                yesterday,
            },
        );

        // Keep the newest sample older than the cutoff as the anchor for the
        // next estimate.
        let cutoff = now - self.max_history;
        let keep = history
            .iter()
            .position(|s| s.at < cutoff)
            .map_or(history.len(), |idx| idx + 1);
        history.truncate(keep);
        trace!(mode = mode.as_str(), today, samples = history.len(), "energy sample");
    }

    /// Estimated current draw in kW for `mode`.
    pub fn power(&self, mode: EnergyMode, estimate: &PowerEstimate, now: DateTime<Utc>) -> f64 {
        let history: Vec<&EnergySample> = self.history(mode).iter().rev().collect();
        let min_power = estimate.min_power;

        let mut energy_to_log = 0.0;
        let mut expected: Option<f64> = None;
        let mut power = 0.0_f64;

        for pair in history.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            let gap = hours(curr.at - prev.at);
            let diff = compute_diff(mode, curr, prev);

            // Energy already attributed to the previous estimate's window.
            if let Some(window) = expected
                && power > 0.0
            {
                energy_to_log -= power.max(min_power) * window.min(gap);
            }

            let window = match estimate.window {
                Some(fixed) => hours(fixed),
                None if prev.first => continue,
                None => gap,
            };
            if window <= 0.0 {
                continue;
            }

            if let Some(diff) = diff {
                energy_to_log += diff;
            }
            power = (energy_to_log / window).max(0.0);

            expected = Some(match estimate.margin {
                Margin::Duration(margin) => window + hours(margin),
                Margin::Factor(factor) => window * (1.0 + factor),
            });

            if power > 0.0 {
                power = power.max(min_power);
            }
        }

        if let (Some(window), Some(last)) = (expected, history.last())
            && hours(now - last.at) > window
        {
            power = 0.0;
        }
        if power > 0.0 {
            power = power.max(min_power);
        }
        power
    }
}
