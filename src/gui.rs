use crate::app::App;
use crate::config::{BAND_MAX, BAND_MIN, BAND_STEP, DRIFT_AXIS_LIMIT, TRADE_FILE_NAME, VALUE_STEP};
use crate::portfolio::{self, DriftTier};
use crate::report::{self, format_grouped, format_money_whole, format_pct};
use chrono::NaiveDate;
use egui_plot::{Bar, BarChart, GridMark, Legend, Line, Plot, PlotBounds, PlotPoint, PlotPoints, Polygon, Text, VLine};
use std::f64::consts::TAU;
use std::ops::RangeInclusive;

// ──────────────────────────────────────────────────────────────────────────────
// Color Palette
// ──────────────────────────────────────────────────────────────────────────────

const ACCENT_BLUE: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
const ACCENT_GREEN: egui::Color32 = egui::Color32::from_rgb(34, 197, 94);
const ACCENT_RED: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);
const ACCENT_YELLOW: egui::Color32 = egui::Color32::from_rgb(250, 204, 21);

const BG_DARK: egui::Color32 = egui::Color32::from_rgb(15, 15, 20);
const BG_CARD: egui::Color32 = egui::Color32::from_rgb(24, 24, 32);
const BG_ELEVATED: egui::Color32 = egui::Color32::from_rgb(32, 32, 44);
const TEXT_PRIMARY: egui::Color32 = egui::Color32::from_rgb(226, 232, 240);
const TEXT_SECONDARY: egui::Color32 = egui::Color32::from_rgb(148, 163, 184);
const BORDER_SUBTLE: egui::Color32 = egui::Color32::from_rgb(51, 51, 68);

const SERIES_COLORS: [egui::Color32; 10] = [
    egui::Color32::from_rgb(59, 130, 246),
    egui::Color32::from_rgb(239, 68, 68),
    egui::Color32::from_rgb(34, 197, 94),
    egui::Color32::from_rgb(168, 85, 247),
    egui::Color32::from_rgb(251, 146, 60),
    egui::Color32::from_rgb(34, 211, 238),
    egui::Color32::from_rgb(236, 72, 153),
    egui::Color32::from_rgb(163, 230, 53),
    egui::Color32::from_rgb(250, 204, 21),
    egui::Color32::from_rgb(148, 163, 184),
];

/// Pie hole as a fraction of the outer radius.
const PIE_HOLE: f64 = 0.45;
/// Largest arc covered by a single pie polygon, in radians.
const PIE_SEGMENT: f64 = TAU / 120.0;

fn series_color(i: usize) -> egui::Color32 {
    SERIES_COLORS[i % SERIES_COLORS.len()]
}

fn tier_color(tier: DriftTier) -> egui::Color32 {
    let (r, g, b) = tier.rgb();
    egui::Color32::from_rgb(r, g, b)
}

// ──────────────────────────────────────────────────────────────────────────────
// Geometry
// ──────────────────────────────────────────────────────────────────────────────

/// Splits an annular sector into convex quads no wider than `PIE_SEGMENT`.
/// Angles are radians clockwise from 12 o'clock.
pub fn donut_segments(start: f64, end: f64, inner: f64, outer: f64) -> Vec<Vec<[f64; 2]>> {
    if end <= start {
        return Vec::new();
    }
    let pieces = ((end - start) / PIE_SEGMENT - 1e-9).ceil().max(1.0) as usize;
    let step = (end - start) / pieces as f64;
    let point = |angle: f64, r: f64| [r * angle.sin(), r * angle.cos()];

    (0..pieces)
        .map(|i| {
            let a0 = start + step * i as f64;
            let a1 = a0 + step;
            vec![point(a0, inner), point(a0, outer), point(a1, outer), point(a1, inner)]
        })
        .collect()
}

/// One trapezoid per interval between consecutive samples of a stacked layer.
pub fn area_quads(lower: &[f64], upper: &[f64]) -> Vec<Vec<[f64; 2]>> {
    let n = lower.len().min(upper.len());
    (1..n)
        .map(|i| {
            let (x0, x1) = ((i - 1) as f64, i as f64);
            vec![
                [x0, lower[i - 1]],
                [x1, lower[i]],
                [x1, upper[i]],
                [x0, upper[i - 1]],
            ]
        })
        .collect()
}

// ──────────────────────────────────────────────────────────────────────────────
// GUI App
// ──────────────────────────────────────────────────────────────────────────────

pub struct GuiApp {
    app: App,
}

impl GuiApp {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    fn apply_theme(ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        style.visuals.window_rounding = egui::Rounding::same(8.0);
        style.visuals.widgets.noninteractive.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.active.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);

        style.visuals.dark_mode = true;
        style.visuals.panel_fill = BG_DARK;
        style.visuals.window_fill = BG_CARD;
        style.visuals.faint_bg_color = BG_ELEVATED;

        style.visuals.widgets.noninteractive.bg_fill = BG_CARD;
        style.visuals.widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, TEXT_SECONDARY);
        style.visuals.widgets.inactive.bg_fill = BG_ELEVATED;
        style.visuals.widgets.inactive.fg_stroke = egui::Stroke::new(1.0, TEXT_PRIMARY);
        style.visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(45, 45, 60);
        style.visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
        style.visuals.widgets.active.bg_fill = ACCENT_BLUE;
        style.visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);

        style.visuals.selection.bg_fill = ACCENT_BLUE.linear_multiply(0.4);
        style.visuals.selection.stroke = egui::Stroke::new(1.0, ACCENT_BLUE);

        style.spacing.item_spacing = egui::vec2(8.0, 6.0);

        ctx.set_style(style);
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_theme(ctx);

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.add_space(8.0);
                ui.label(egui::RichText::new("Portfolio Dashboard")
                    .size(18.0)
                    .strong()
                    .color(ACCENT_BLUE));
                ui.add_space(4.0);
                ui.label(egui::RichText::new(format!(
                    "{} tickers  |  {} snapshots",
                    self.app.table.tickers().len(),
                    self.app.table.len()
                ))
                .size(11.0)
                .color(TEXT_SECONDARY));
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    self.render_summary(ui);
                    ui.add_space(16.0);
                    self.render_pie(ui);
                    ui.add_space(16.0);
                    self.render_table(ui);
                    ui.add_space(16.0);
                    self.render_history(ui);
                    ui.add_space(16.0);
                    self.render_drift(ui);
                    ui.add_space(16.0);
                    self.render_trades(ui);
                    ui.add_space(24.0);
                });
        });
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Sections
// ──────────────────────────────────────────────────────────────────────────────

impl GuiApp {
    fn render_summary(&mut self, ui: &mut egui::Ui) {
        section_header(ui, "Summary");
        let table = self.app.table.clone();
        date_slider(ui, "Select Date for Snapshot", &mut self.app.summary_date, table.dates());

        let Some((date, analysis)) = self.app.analysis_at(self.app.summary_date) else {
            return;
        };
        card(ui, |ui| {
            for (label, value) in report::summary_lines(
                date,
                &analysis,
                self.app.settings.portfolio_value,
                self.app.settings.rebalance_threshold,
            ) {
                let color = match value.as_str() {
                    "Yes" => ACCENT_RED,
                    "No" => ACCENT_GREEN,
                    _ => TEXT_PRIMARY,
                };
                stat_row(ui, &label, &value, color);
            }
        });
    }

    fn render_pie(&mut self, ui: &mut egui::Ui) {
        section_header(ui, "Allocation Pie");
        let table = self.app.table.clone();
        date_slider(ui, "Select Date for Pie Chart", &mut self.app.pie_date, table.dates());

        let Some((_, analysis)) = self.app.analysis_at(self.app.pie_date) else {
            return;
        };
        let slices = portfolio::pie_slices(&analysis.current);

        Plot::new("allocation_pie")
            .height(320.0)
            .data_aspect(1.0)
            .show_axes(false)
            .show_grid(false)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .legend(Legend::default().position(egui_plot::Corner::RightTop))
            .show(ui, |plot_ui| {
                let mut angle = 0.0;
                for (i, slice) in slices.iter().enumerate() {
                    let sweep = slice.share * TAU;
                    let color = series_color(i);
                    for quad in donut_segments(angle, angle + sweep, PIE_HOLE, 1.0) {
                        plot_ui.polygon(
                            Polygon::new(PlotPoints::from(quad))
                                .fill_color(color)
                                .stroke(egui::Stroke::new(0.5, color))
                                .name(&slice.ticker),
                        );
                    }
                    let mid = angle + sweep / 2.0;
                    let r = (1.0 + PIE_HOLE) / 2.0;
                    plot_ui.text(
                        Text::new(
                            PlotPoint::new(r * mid.sin(), r * mid.cos()),
                            format!("{}\n{:.1}%", slice.ticker, slice.share * 100.0),
                        )
                        .color(egui::Color32::WHITE),
                    );
                    angle += sweep;
                }
            });
    }

    fn render_table(&mut self, ui: &mut egui::Ui) {
        section_header(ui, "Allocation Table");
        let table = self.app.table.clone();
        date_slider(ui, "Select Date for Table", &mut self.app.table_date, table.dates());

        let Some((_, analysis)) = self.app.analysis_at(self.app.table_date) else {
            return;
        };
        let rows = portfolio::allocation_table(&analysis, self.app.settings.portfolio_value);

        card(ui, |ui| {
            egui::Grid::new("allocation_table")
                .striped(true)
                .num_columns(5)
                .spacing([24.0, 4.0])
                .show(ui, |ui| {
                    for h in ["Ticker", "Current%", "Target%", "Drift%", "$"] {
                        ui.label(egui::RichText::new(h).strong().color(TEXT_SECONDARY));
                    }
                    ui.end_row();

                    for r in &rows {
                        let drift_color = if r.drift > 0.0 {
                            ACCENT_RED
                        } else if r.drift < 0.0 {
                            ACCENT_BLUE
                        } else {
                            TEXT_PRIMARY
                        };
                        ui.label(egui::RichText::new(&r.ticker).strong().color(TEXT_PRIMARY));
                        ui.monospace(format_pct(r.current_pct));
                        ui.monospace(format_pct(r.target_pct));
                        ui.label(egui::RichText::new(format_pct(r.drift_pct)).monospace().color(drift_color));
                        ui.monospace(format_grouped(r.dollars, 2));
                        ui.end_row();
                    }
                });
        });
    }

    fn render_history(&mut self, ui: &mut egui::Ui) {
        section_header(ui, "Allocation History");
        let series = self.app.history();
        if series.is_empty() {
            return;
        }
        let stacked = portfolio::stack_series(&series);
        let labels: Vec<String> = self
            .app
            .table
            .timestamps()
            .iter()
            .map(|t| t.format("%Y-%m-%d").to_string())
            .collect();

        Plot::new("allocation_history")
            .height(320.0)
            .include_y(0.0)
            .include_y(1.0)
            .legend(Legend::default().position(egui_plot::Corner::LeftTop))
            .x_axis_formatter(move |mark: GridMark, _range: &RangeInclusive<f64>| {
                index_label(&labels, mark.value)
            })
            .y_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format!("{:.0}%", mark.value * 100.0)
            })
            .show(ui, |plot_ui| {
                let zeros = vec![0.0; stacked.first().map(|s| s.len()).unwrap_or(0)];
                for (i, (s, upper)) in series.iter().zip(stacked.iter()).enumerate() {
                    let lower = if i == 0 { &zeros } else { &stacked[i - 1] };
                    let color = series_color(i);
                    for quad in area_quads(lower, upper) {
                        plot_ui.polygon(
                            Polygon::new(PlotPoints::from(quad))
                                .fill_color(color.linear_multiply(0.6))
                                .stroke(egui::Stroke::NONE)
                                .name(&s.ticker),
                        );
                    }
                    let edge: Vec<[f64; 2]> = upper
                        .iter()
                        .enumerate()
                        .map(|(x, y)| [x as f64, *y])
                        .collect();
                    plot_ui.line(Line::new(PlotPoints::from(edge)).color(color).width(1.5).name(&s.ticker));
                }
            });
    }

    fn render_drift(&mut self, ui: &mut egui::Ui) {
        section_header(ui, "Drift Monitor");
        let table = self.app.table.clone();
        date_slider(ui, "Select Date for Drift Monitor", &mut self.app.drift_date, table.dates());
        band_slider(ui, "Drift Threshold (±)", &mut self.app.drift_band);

        let Some((_, analysis)) = self.app.analysis_at(self.app.drift_date) else {
            return;
        };
        let bars = portfolio::drift_bars(&analysis.drift, self.app.drift_band);
        let tickers: Vec<String> = bars.iter().map(|b| b.ticker.clone()).collect();
        let n = bars.len() as f64;

        Plot::new("drift_monitor")
            .height((bars.len() as f32 * 22.0).clamp(200.0, 600.0))
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .legend(Legend::default().position(egui_plot::Corner::RightTop))
            .x_axis_label("Weight drift (Current − Target)")
            .x_axis_formatter(|mark: GridMark, _range: &RangeInclusive<f64>| {
                format!("{:.1}%", mark.value * 100.0)
            })
            .y_axis_formatter(move |mark: GridMark, _range: &RangeInclusive<f64>| {
                index_label(&tickers, mark.value)
            })
            .show(ui, |plot_ui| {
                // One chart per tier so the legend doubles as the tier key.
                for tier in DriftTier::ALL {
                    let color = tier_color(tier);
                    let tier_bars: Vec<Bar> = bars
                        .iter()
                        .enumerate()
                        .filter(|(_, b)| b.tier == tier)
                        .map(|(i, b)| {
                            Bar::new(i as f64, b.drift)
                                .name(format!("{}  {}", b.ticker, format_pct(b.drift)))
                                .fill(color)
                                .width(0.7)
                        })
                        .collect();
                    plot_ui.bar_chart(
                        BarChart::new(tier_bars)
                            .horizontal()
                            .color(color)
                            .name(tier.label()),
                    );
                }
                plot_ui.vline(VLine::new(0.0).color(egui::Color32::WHITE).width(1.0));
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [-DRIFT_AXIS_LIMIT, -1.0],
                    [DRIFT_AXIS_LIMIT, n],
                ));
            });
    }

    fn render_trades(&mut self, ui: &mut egui::Ui) {
        section_header(ui, "Trade Suggestions");
        let table = self.app.table.clone();
        date_slider(ui, "Select Date for Trade Suggestions", &mut self.app.trade_date, table.dates());
        band_slider(ui, "Trade Drift Band", &mut self.app.trade_band);
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Portfolio Value for Trades").color(TEXT_SECONDARY));
            ui.add(
                egui::DragValue::new(&mut self.app.trade_value)
                    .speed(VALUE_STEP)
                    .range(0.0..=f64::MAX)
                    .prefix("$")
                    .max_decimals(2),
            );
            ui.label(egui::RichText::new(format_money_whole(self.app.trade_value)).color(TEXT_SECONDARY));
        });

        let Some((_, plan)) = self.app.trade_plan() else {
            return;
        };

        ui.add_space(6.0);
        ui.columns(2, |cols| {
            cols[0].label(egui::RichText::new("Buy").size(15.0).strong().color(ACCENT_BLUE));
            cols[0].code(report::buy_text(&plan));
            cols[1].label(egui::RichText::new("Sell").size(15.0).strong().color(ACCENT_RED));
            cols[1].code(report::sell_text(&plan));
        });

        if !plan.is_empty() {
            ui.add_space(8.0);
            let btn = ui.add(
                egui::Button::new(
                    egui::RichText::new(format!("Save {}", TRADE_FILE_NAME))
                        .strong()
                        .color(egui::Color32::WHITE),
                )
                .fill(ACCENT_BLUE)
                .rounding(egui::Rounding::same(6.0)),
            );
            if btn.clicked() {
                self.app.save_trades();
            }
        }

        if let Some(err) = &self.app.error_msg {
            ui.label(egui::RichText::new(format!("Error: {}", err)).color(ACCENT_RED).size(12.0));
        } else if let Some(msg) = &self.app.status_msg {
            ui.label(egui::RichText::new(msg).color(ACCENT_GREEN).size(12.0));
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Widgets
// ──────────────────────────────────────────────────────────────────────────────

/// Label for an integer grid mark; blank between samples.
fn index_label(labels: &[String], value: f64) -> String {
    let rounded = value.round();
    if (value - rounded).abs() > 1e-6 || rounded < 0.0 {
        return String::new();
    }
    labels.get(rounded as usize).cloned().unwrap_or_default()
}

fn date_slider(ui: &mut egui::Ui, label: &str, idx: &mut usize, dates: &[NaiveDate]) {
    let max = dates.len().saturating_sub(1);
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).color(TEXT_SECONDARY));
        ui.add(
            egui::Slider::new(idx, 0..=max).custom_formatter(|v, _| {
                dates
                    .get(v.round() as usize)
                    .map(|d| report::format_date(*d))
                    .unwrap_or_default()
            }),
        );
    });
}

fn band_slider(ui: &mut egui::Ui, label: &str, band: &mut f64) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).color(TEXT_SECONDARY));
        ui.add(
            egui::Slider::new(band, BAND_MIN..=BAND_MAX)
                .step_by(BAND_STEP)
                .custom_formatter(|v, _| format!("{:.1}%", v * 100.0)),
        );
    });
}

fn card(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Frame::none()
        .fill(BG_CARD)
        .rounding(egui::Rounding::same(8.0))
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, add_contents);
}

fn section_header(ui: &mut egui::Ui, text: &str) {
    ui.label(egui::RichText::new(text)
        .size(16.0)
        .strong()
        .color(ACCENT_YELLOW));
    ui.add_space(4.0);
}

fn stat_row(ui: &mut egui::Ui, label: &str, value: &str, color: egui::Color32) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).size(12.0).color(TEXT_SECONDARY));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(egui::RichText::new(value).size(13.0).strong().color(color));
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_donut_segments_cover_sweep() {
        let quads = donut_segments(0.0, TAU / 4.0, 0.5, 1.0);
        assert_eq!(quads.len(), 30);
        assert!(quads.iter().all(|q| q.len() == 4));

        let first = &quads[0];
        // Starts at 12 o'clock.
        assert!((first[0][0]).abs() < 1e-12 && (first[0][1] - 0.5).abs() < 1e-12);
        assert!((first[1][1] - 1.0).abs() < 1e-12);

        let last = quads.last().unwrap();
        // Ends at 3 o'clock.
        assert!((last[2][0] - 1.0).abs() < 1e-9 && last[2][1].abs() < 1e-9);

        assert!(donut_segments(1.0, 1.0, 0.5, 1.0).is_empty());
    }

    #[test]
    fn test_area_quads() {
        let lower = [0.0, 0.1, 0.2];
        let upper = [0.5, 0.6, 0.7];
        let quads = area_quads(&lower, &upper);
        assert_eq!(quads.len(), 2);
        assert_eq!(quads[1], vec![[1.0, 0.1], [2.0, 0.2], [2.0, 0.7], [1.0, 0.6]]);
        assert!(area_quads(&[0.0], &[1.0]).is_empty());
    }

    #[test]
    fn test_index_label() {
        let labels = vec!["AAA".to_string(), "BBB".to_string()];
        assert_eq!(index_label(&labels, 1.0), "BBB");
        assert_eq!(index_label(&labels, 0.5), "");
        assert_eq!(index_label(&labels, -1.0), "");
        assert_eq!(index_label(&labels, 5.0), "");
    }
}
