use crate::data::{WeightTable, Weights};
use serde::Serialize;

/// Reserved ticker that never receives a target allocation. Matched
/// case-insensitively and exactly.
pub const CASH_SYMBOL: &str = "cash";

pub fn is_cash(ticker: &str) -> bool {
    ticker.eq_ignore_ascii_case(CASH_SYMBOL)
}

/// Weight of the first cash-like column in the snapshot, if any.
pub fn cash_weight(snapshot: &Weights) -> Option<f64> {
    snapshot.iter().find(|(t, _)| is_cash(t)).map(|(_, w)| w)
}

// ──────────────────────────────────────────────────────────────────────────────
// Targets & Drift
// ──────────────────────────────────────────────────────────────────────────────

/// Equal-weight targets: every non-cash ticker gets `1 / N`, cash gets 0.
///
/// With no non-cash tickers every entry (if any) is 0.
pub fn equal_weight_targets(snapshot: &Weights) -> Weights {
    let non_cash = snapshot.tickers().filter(|t| !is_cash(t)).count();
    let equal_wt = if non_cash > 0 {
        1.0 / non_cash as f64
    } else {
        0.0
    };
    snapshot
        .tickers()
        .map(|t| (t, if is_cash(t) { 0.0 } else { equal_wt }))
        .collect()
}

/// Elementwise `current - target` over the union of both key sets. A ticker
/// missing on either side counts as weight 0 there. Current's order comes
/// first, then any target-only tickers.
pub fn compute_drift(current: &Weights, target: &Weights) -> Weights {
    let mut drift: Weights = current
        .iter()
        .map(|(t, w)| (t, w - target.get(t).unwrap_or(0.0)))
        .collect();
    for (t, w) in target.iter() {
        if !current.contains(t) {
            drift.insert(t, -w);
        }
    }
    drift
}

/// True iff any ticker's absolute drift is strictly greater than `threshold`.
pub fn needs_rebalance(drift: &Weights, threshold: f64) -> bool {
    drift.values().any(|d| d.abs() > threshold)
}

/// Targets and drift for one snapshot, computed once and shared by every view
/// rendered from it.
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotAnalysis {
    pub current: Weights,
    pub targets: Weights,
    pub drift: Weights,
}

impl SnapshotAnalysis {
    pub fn new(current: Weights) -> Self {
        let targets = equal_weight_targets(&current);
        let drift = compute_drift(&current, &targets);
        Self {
            current,
            targets,
            drift,
        }
    }

    pub fn needs_rebalance(&self, threshold: f64) -> bool {
        needs_rebalance(&self.drift, threshold)
    }

    pub fn trades(&self, band: f64, portfolio_value: f64) -> TradePlan {
        suggest_trades(&self.current, &self.targets, band, portfolio_value)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Trade Suggestions
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TradeSuggestion {
    pub action: TradeAction,
    pub ticker: String,
    /// Absolute dollar drift.
    pub amount: f64,
}

/// Buy and sell suggestions, each in snapshot column order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TradePlan {
    pub buys: Vec<TradeSuggestion>,
    pub sells: Vec<TradeSuggestion>,
}

impl TradePlan {
    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    /// Buys first, then sells.
    pub fn iter(&self) -> impl Iterator<Item = &TradeSuggestion> + '_ {
        self.buys.iter().chain(self.sells.iter())
    }
}

/// Suggests a trade for every ticker whose dollar drift strictly exceeds
/// `band * portfolio_value`. Underweight tickers are bought, overweight sold.
pub fn suggest_trades(
    current: &Weights,
    target: &Weights,
    band: f64,
    portfolio_value: f64,
) -> TradePlan {
    let threshold = band * portfolio_value;
    let mut plan = TradePlan::default();

    for (ticker, drift) in compute_drift(current, target).iter() {
        let dollar_drift = drift * portfolio_value;
        if dollar_drift.abs() <= threshold {
            continue;
        }
        // |dollar_drift| > threshold >= 0, so it is never exactly zero here.
        let action = if dollar_drift < 0.0 {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        };
        let suggestion = TradeSuggestion {
            action,
            ticker: ticker.to_string(),
            amount: dollar_drift.abs(),
        };
        match action {
            TradeAction::Buy => plan.buys.push(suggestion),
            TradeAction::Sell => plan.sells.push(suggestion),
        }
    }

    plan
}

// ──────────────────────────────────────────────────────────────────────────────
// Drift Tiers
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DriftTier {
    BuyUrgent,
    BuyWatch,
    BuyMinor,
    SellUrgent,
    SellWatch,
    SellMinor,
}

impl DriftTier {
    /// Legend order.
    pub const ALL: [DriftTier; 6] = [
        DriftTier::BuyUrgent,
        DriftTier::BuyWatch,
        DriftTier::BuyMinor,
        DriftTier::SellUrgent,
        DriftTier::SellWatch,
        DriftTier::SellMinor,
    ];

    /// Zero drift lands on the sell side.
    pub fn classify(drift: f64, band: f64) -> Self {
        let magnitude = drift.abs();
        let urgent = magnitude > band;
        let watch = magnitude > band * 0.5;
        if drift >= 0.0 {
            if urgent {
                Self::SellUrgent
            } else if watch {
                Self::SellWatch
            } else {
                Self::SellMinor
            }
        } else if urgent {
            Self::BuyUrgent
        } else if watch {
            Self::BuyWatch
        } else {
            Self::BuyMinor
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Self::BuyUrgent | Self::BuyWatch | Self::BuyMinor)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BuyUrgent => "Buy urgent (>|band|)",
            Self::BuyWatch => "Buy watch (0.5–1×)",
            Self::BuyMinor => "Buy minor (<0.5×)",
            Self::SellUrgent => "Sell urgent (>|band|)",
            Self::SellWatch => "Sell watch (0.5–1×)",
            Self::SellMinor => "Sell minor (<0.5×)",
        }
    }

    /// Palette as RGB, dark for urgent, light for minor.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::BuyUrgent => (25, 25, 112),
            Self::BuyWatch => (30, 144, 255),
            Self::BuyMinor => (135, 206, 250),
            Self::SellUrgent => (178, 34, 34),
            Self::SellWatch => (255, 99, 71),
            Self::SellMinor => (255, 160, 122),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriftBar {
    pub ticker: String,
    pub drift: f64,
    pub tier: DriftTier,
}

pub fn drift_bars(drift: &Weights, band: f64) -> Vec<DriftBar> {
    drift
        .iter()
        .map(|(ticker, d)| DriftBar {
            ticker: ticker.to_string(),
            drift: d,
            tier: DriftTier::classify(d, band),
        })
        .collect()
}

// ──────────────────────────────────────────────────────────────────────────────
// Allocation Views
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AllocationRow {
    pub ticker: String,
    pub current: f64,
    pub target: f64,
    pub drift: f64,
    pub current_pct: f64,
    pub target_pct: f64,
    pub drift_pct: f64,
    /// Dollar exposure, `current * portfolio_value`.
    pub dollars: f64,
}

/// Table rows normalized by the snapshot's total weight. A zero total leaves
/// the values unnormalized.
pub fn allocation_table(analysis: &SnapshotAnalysis, portfolio_value: f64) -> Vec<AllocationRow> {
    let total = analysis.current.total();
    let denom = if total != 0.0 { total } else { 1.0 };

    analysis
        .current
        .iter()
        .map(|(ticker, current)| {
            let target = analysis.targets.get(ticker).unwrap_or(0.0);
            let drift = current - target;
            AllocationRow {
                ticker: ticker.to_string(),
                current,
                target,
                drift,
                current_pct: current / denom,
                target_pct: target / denom,
                drift_pct: drift / denom,
                dollars: current * portfolio_value,
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PieSlice {
    pub ticker: String,
    pub weight: f64,
    pub share: f64,
}

/// Positive weights with their share of the positive total.
pub fn pie_slices(snapshot: &Weights) -> Vec<PieSlice> {
    let total: f64 = snapshot.values().filter(|w| *w > 0.0).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    snapshot
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(ticker, weight)| PieSlice {
            ticker: ticker.to_string(),
            weight,
            share: weight / total,
        })
        .collect()
}

/// The `n` largest holdings, descending. Equal weights keep column order.
pub fn top_holdings(snapshot: &Weights, n: usize) -> Vec<String> {
    let mut ranked: Vec<(&str, f64)> = snapshot.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(n)
        .map(|(t, _)| t.to_string())
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistorySeries {
    pub ticker: String,
    pub weights: Vec<f64>,
}

/// Full-history weight series for the top `n` holdings of `snapshot`.
pub fn allocation_history(table: &WeightTable, snapshot: &Weights, n: usize) -> Vec<HistorySeries> {
    top_holdings(snapshot, n)
        .into_iter()
        .filter_map(|ticker| {
            let weights = table.series(&ticker)?;
            Some(HistorySeries { ticker, weights })
        })
        .collect()
}

/// Running sums across series, bottom layer first, for a stacked area view.
pub fn stack_series(series: &[HistorySeries]) -> Vec<Vec<f64>> {
    let len = series.iter().map(|s| s.weights.len()).max().unwrap_or(0);
    let mut running = vec![0.0; len];
    series
        .iter()
        .map(|s| {
            for (acc, w) in running.iter_mut().zip(s.weights.iter()) {
                *acc += w;
            }
            running.clone()
        })
        .collect()
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::sample_table;
    use proptest::prelude::*;

    fn reference_snapshot() -> Weights {
        [("AAA", 0.6), ("BBB", 0.4), ("Cash", 0.0)]
            .into_iter()
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_equal_weight_targets_reference() {
        let targets = equal_weight_targets(&reference_snapshot());
        assert_eq!(targets.get("AAA"), Some(0.5));
        assert_eq!(targets.get("BBB"), Some(0.5));
        assert_eq!(targets.get("Cash"), Some(0.0));
    }

    #[test]
    fn test_cash_match_is_case_insensitive_and_exact() {
        let snap: Weights = [("CASH", 0.1), ("cash", 0.1), ("CashX", 0.4), ("AAA", 0.4)]
            .into_iter()
            .collect();
        let targets = equal_weight_targets(&snap);
        assert_eq!(targets.get("CASH"), Some(0.0));
        assert_eq!(targets.get("cash"), Some(0.0));
        assert_eq!(targets.get("CashX"), Some(0.5));
        assert_eq!(targets.get("AAA"), Some(0.5));
    }

    #[test]
    fn test_targets_for_empty_and_all_cash() {
        assert!(equal_weight_targets(&Weights::new()).is_empty());

        let only_cash: Weights = [("Cash", 1.0)].into_iter().collect();
        let targets = equal_weight_targets(&only_cash);
        assert_eq!(targets.get("Cash"), Some(0.0));
        assert_eq!(targets.total(), 0.0);
    }

    #[test]
    fn test_drift_reference() {
        let analysis = SnapshotAnalysis::new(reference_snapshot());
        assert!(approx(analysis.drift.get("AAA").unwrap(), 0.1));
        assert!(approx(analysis.drift.get("BBB").unwrap(), -0.1));
        assert_eq!(analysis.drift.get("Cash"), Some(0.0));
        assert!(analysis.needs_rebalance(0.02));
        assert!(!analysis.needs_rebalance(0.2));
    }

    #[test]
    fn test_drift_treats_missing_keys_as_zero() {
        let current: Weights = [("AAA", 0.7), ("BBB", 0.3)].into_iter().collect();
        let target: Weights = [("BBB", 0.5), ("CCC", 0.5)].into_iter().collect();
        let drift = compute_drift(&current, &target);
        let items: Vec<(&str, f64)> = drift.iter().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], ("AAA", 0.7));
        assert!(approx(items[1].1, -0.2));
        assert_eq!(items[2], ("CCC", -0.5));
    }

    #[test]
    fn test_rebalance_threshold_is_strict() {
        let drift: Weights = [("AAA", 0.02), ("BBB", -0.02)].into_iter().collect();
        assert!(!needs_rebalance(&drift, 0.02));
        assert!(needs_rebalance(&drift, 0.019));
    }

    #[test]
    fn test_trades_reference() {
        let analysis = SnapshotAnalysis::new(reference_snapshot());
        let plan = analysis.trades(0.02, 10_000.0);

        assert_eq!(plan.buys.len(), 1);
        assert_eq!(plan.buys[0].ticker, "BBB");
        assert_eq!(plan.buys[0].action, TradeAction::Buy);
        assert!((plan.buys[0].amount - 1000.0).abs() < 1e-6);

        assert_eq!(plan.sells.len(), 1);
        assert_eq!(plan.sells[0].ticker, "AAA");
        assert_eq!(plan.sells[0].action, TradeAction::Sell);
        assert!((plan.sells[0].amount - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_wide_band_suppresses_all_trades() {
        let analysis = SnapshotAnalysis::new(reference_snapshot());
        let plan = analysis.trades(0.20, 10_000.0);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_drift_equal_to_threshold_is_excluded() {
        // 0.25 and 0.5 are exact in binary, so dollar drift equals the threshold exactly.
        let current: Weights = [("AAA", 0.75), ("BBB", 0.25)].into_iter().collect();
        let target: Weights = [("AAA", 0.5), ("BBB", 0.5)].into_iter().collect();
        let plan = suggest_trades(&current, &target, 0.25, 1000.0);
        assert!(plan.is_empty());

        let plan = suggest_trades(&current, &target, 0.24, 1000.0);
        assert_eq!(plan.buys.len(), 1);
        assert_eq!(plan.sells.len(), 1);
    }

    #[test]
    fn test_zero_band_suggests_every_nonzero_drift() {
        let analysis = SnapshotAnalysis::new(reference_snapshot());
        let plan = analysis.trades(0.0, 10_000.0);
        let tickers: Vec<&str> = plan.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "AAA"]);
    }

    #[test]
    fn test_trades_follow_column_order_not_magnitude() {
        let snap: Weights = [("AAA", 0.30), ("BBB", 0.45), ("CCC", 0.05), ("DDD", 0.20)]
            .into_iter()
            .collect();
        let analysis = SnapshotAnalysis::new(snap);
        let plan = analysis.trades(0.01, 1000.0);
        let buys: Vec<&str> = plan.buys.iter().map(|s| s.ticker.as_str()).collect();
        let sells: Vec<&str> = plan.sells.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(buys, vec!["CCC", "DDD"]);
        assert_eq!(sells, vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(DriftTier::classify(0.03, 0.02), DriftTier::SellUrgent);
        assert_eq!(DriftTier::classify(-0.011, 0.02), DriftTier::BuyWatch);
        assert_eq!(DriftTier::classify(0.005, 0.02), DriftTier::SellMinor);
        assert_eq!(DriftTier::classify(-0.03, 0.02), DriftTier::BuyUrgent);
        assert_eq!(DriftTier::classify(0.015, 0.02), DriftTier::SellWatch);
        assert_eq!(DriftTier::classify(-0.001, 0.02), DriftTier::BuyMinor);
        assert_eq!(DriftTier::classify(0.0, 0.02), DriftTier::SellMinor);
        // Exactly at the band is not urgent.
        assert_eq!(DriftTier::classify(0.02, 0.02), DriftTier::SellWatch);
        // Zero band: any non-zero drift is urgent.
        assert_eq!(DriftTier::classify(-0.0001, 0.0), DriftTier::BuyUrgent);
    }

    #[test]
    fn test_tier_legend_is_complete() {
        let buys = DriftTier::ALL.iter().filter(|t| t.is_buy()).count();
        assert_eq!(buys, 3);
        assert_eq!(DriftTier::BuyWatch.label(), "Buy watch (0.5–1×)");
    }

    #[test]
    fn test_allocation_table_normalizes_by_total() {
        let snap: Weights = [("AAA", 0.45), ("BBB", 0.45)].into_iter().collect();
        let analysis = SnapshotAnalysis::new(snap);
        let rows = allocation_table(&analysis, 50_000.0);
        assert_eq!(rows.len(), 2);
        assert!(approx(rows[0].current_pct, 0.5));
        assert!(approx(rows[0].target_pct, 0.5 / 0.9));
        assert!(approx(rows[0].drift_pct, -0.05 / 0.9));
        assert!(approx(rows[0].dollars, 22_500.0));
    }

    #[test]
    fn test_allocation_table_zero_total() {
        let snap: Weights = [("AAA", 0.0), ("BBB", 0.0)].into_iter().collect();
        let rows = allocation_table(&SnapshotAnalysis::new(snap), 1000.0);
        assert!(rows.iter().all(|r| r.current_pct.is_finite()));
        assert!(approx(rows[0].target_pct, 0.5));
    }

    #[test]
    fn test_pie_slices_skip_non_positive() {
        let snap: Weights = [("AAA", 0.6), ("Cash", 0.0), ("BBB", 0.2)].into_iter().collect();
        let slices = pie_slices(&snap);
        assert_eq!(slices.len(), 2);
        assert!(approx(slices[0].share, 0.75));
        assert!(pie_slices(&Weights::new()).is_empty());
    }

    #[test]
    fn test_top_holdings_and_history() {
        let table = sample_table();
        let snap = table.snapshot_at(table.len() - 1).unwrap();
        assert_eq!(top_holdings(&snap, 2), vec!["AAA", "BBB"]);

        let history = allocation_history(&table, &snap, 8);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].weights, vec![0.50, 0.55, 0.60]);

        let stacked = stack_series(&history);
        assert_eq!(stacked.len(), 3);
        assert!(stacked[2].iter().all(|v| approx(*v, 1.0)));
    }

    #[test]
    fn test_cash_weight_lookup() {
        assert_eq!(cash_weight(&reference_snapshot()), Some(0.0));
        let no_cash: Weights = [("AAA", 1.0)].into_iter().collect();
        assert_eq!(cash_weight(&no_cash), None);
    }

    fn snapshot_strategy() -> impl Strategy<Value = Weights> {
        prop::collection::vec(
            (
                prop_oneof![
                    4 => "[A-Z]{2,4}",
                    1 => Just("Cash".to_string()),
                    1 => Just("CASH".to_string()),
                ],
                0.0f64..1.0,
            ),
            0..12,
        )
        .prop_map(|pairs| pairs.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_targets_sum_to_one_or_zero(snap in snapshot_strategy()) {
            let targets = equal_weight_targets(&snap);
            let non_cash = snap.tickers().filter(|t| !is_cash(t)).count();
            let sum = targets.total();
            if non_cash > 0 {
                prop_assert!((sum - 1.0).abs() < 1e-9);
            } else {
                prop_assert_eq!(sum, 0.0);
            }
            for (t, w) in targets.iter() {
                if is_cash(t) {
                    prop_assert_eq!(w, 0.0);
                }
            }
        }

        #[test]
        fn prop_pure_and_idempotent(snap in snapshot_strategy(), band in 0.0f64..0.1, value in 1.0f64..1e7) {
            let a = SnapshotAnalysis::new(snap.clone());
            let b = SnapshotAnalysis::new(snap);
            prop_assert_eq!(&a.targets, &b.targets);
            prop_assert_eq!(&a.drift, &b.drift);
            prop_assert_eq!(a.trades(band, value), b.trades(band, value));
        }

        #[test]
        fn prop_suggestions_strictly_exceed_threshold(snap in snapshot_strategy(), band in 0.0f64..0.1, value in 1.0f64..1e7) {
            let analysis = SnapshotAnalysis::new(snap);
            let plan = analysis.trades(band, value);
            for s in &plan.buys {
                prop_assert!(s.amount > band * value);
                prop_assert!(analysis.drift.get(&s.ticker).unwrap() < 0.0);
            }
            for s in &plan.sells {
                prop_assert!(s.amount > band * value);
                prop_assert!(analysis.drift.get(&s.ticker).unwrap() > 0.0);
            }
            let suggested = plan.buys.len() + plan.sells.len();
            let expected = analysis.drift.values().filter(|d| (d * value).abs() > band * value).count();
            prop_assert_eq!(suggested, expected);
        }
    }
}
