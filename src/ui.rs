use crate::app::{App, Section};
use crate::config::DRIFT_AXIS_LIMIT;
use crate::portfolio::{self, DriftTier};
use crate::report::{self, format_grouped, format_money_whole, format_pct};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph,
        Row, Table, Tabs, Wrap,
    },
    Frame,
};

const SERIES_COLORS: [Color; 8] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Blue,
    Color::LightRed,
    Color::LightGreen,
    Color::LightCyan,
];

fn series_color(i: usize) -> Color {
    SERIES_COLORS[i % SERIES_COLORS.len()]
}

fn tier_color(tier: DriftTier) -> Color {
    let (r, g, b) = tier.rgb();
    Color::Rgb(r, g, b)
}

pub fn render(f: &mut Frame, app: &App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, layout[0]);

    match app.section {
        Section::Summary => render_summary(f, app, layout[1]),
        Section::Pie => render_pie(f, app, layout[1]),
        Section::Table => render_table(f, app, layout[1]),
        Section::History => render_history(f, app, layout[1]),
        Section::Drift => render_drift(f, app, layout[1]),
        Section::Trades => render_trades(f, app, layout[1]),
    }

    render_footer(f, app, layout[2]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = Section::ALL
        .iter()
        .enumerate()
        .map(|(i, s)| Line::from(format!("{} {}", i + 1, s.title())))
        .collect();
    let selected = Section::ALL
        .iter()
        .position(|s| *s == app.section)
        .unwrap_or(0);

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(
                    " Portfolio Dashboard ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )),
        )
        .select(selected)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let hint = match app.section {
        Section::Drift => "←/→: date | +/-: band | Tab: section | q: quit",
        Section::Trades => "←/→: date | +/-: band | [/]: value | d: save | Tab: section | q: quit",
        _ => "←/→: date | Home/End: first/last | Tab: section | q: quit",
    };

    let mut spans = vec![
        Span::styled(" Controls: ", Style::default().fg(Color::Gray)),
        Span::styled(hint, Style::default().fg(Color::White)),
    ];
    if let Some(err) = &app.error_msg {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(err.as_str(), Style::default().fg(Color::Red)));
    } else if let Some(msg) = &app.status_msg {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(msg.as_str(), Style::default().fg(Color::Green)));
    }

    let footer = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

/// Block title showing the section's date selector position.
fn date_title(app: &App, title: &str, idx: usize) -> Line<'static> {
    let date = app
        .date_at(idx)
        .map(report::format_date)
        .unwrap_or_else(|| "—".to_string());
    Line::from(vec![
        Span::styled(
            format!(" {} ", title),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("◀ {} ▶ ({}/{}) ", date, idx + 1, app.dates().len()),
            Style::default().fg(Color::Yellow),
        ),
    ])
}

fn render_missing(f: &mut Frame, area: Rect, title: Line<'static>) {
    let text = Paragraph::new("No snapshot for the selected date")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(text, area);
}

fn render_summary(f: &mut Frame, app: &App, area: Rect) {
    let title = date_title(app, "Summary", app.summary_date);
    let Some((date, analysis)) = app.analysis_at(app.summary_date) else {
        return render_missing(f, area, title);
    };

    let mut lines = vec![Line::from("")];
    for (label, value) in report::summary_lines(
        date,
        &analysis,
        app.settings.portfolio_value,
        app.settings.rebalance_threshold,
    ) {
        let color = match value.as_str() {
            "Yes" => Color::Red,
            "No" => Color::Green,
            _ => Color::White,
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<18}", label), Style::default().fg(Color::Gray)),
            Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(
            "  Tickers: {}  |  Snapshots: {}  |  Rebalance threshold: ±{}",
            app.table.tickers().len(),
            app.table.len(),
            format_pct(app.settings.rebalance_threshold)
        ),
        Style::default().fg(Color::DarkGray),
    )));

    let summary = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(summary, area);
}

fn render_pie(f: &mut Frame, app: &App, area: Rect) {
    let title = date_title(app, "Allocation Pie", app.pie_date);
    let Some((_, analysis)) = app.analysis_at(app.pie_date) else {
        return render_missing(f, area, title);
    };

    let slices = portfolio::pie_slices(&analysis.current);
    // Shares in basis points so small holdings still register.
    let bars: Vec<Bar> = slices
        .iter()
        .enumerate()
        .map(|(i, s)| {
            Bar::default()
                .value((s.share * 10_000.0).round() as u64)
                .label(Line::from(s.ticker.clone()))
                .text_value(format!("{:.1}%", s.share * 100.0))
                .style(Style::default().fg(series_color(i)))
        })
        .collect();

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .max(10_000)
        .data(BarGroup::default().bars(&bars));
    f.render_widget(chart, area);
}

fn render_table(f: &mut Frame, app: &App, area: Rect) {
    let title = date_title(app, "Allocation Table", app.table_date);
    let Some((_, analysis)) = app.analysis_at(app.table_date) else {
        return render_missing(f, area, title);
    };

    let header_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let header = Row::new(
        ["Ticker", "Current%", "Target%", "Drift%", "$"]
            .into_iter()
            .map(|h| Cell::from(h).style(header_style)),
    )
    .height(1)
    .bottom_margin(1);

    let rows = portfolio::allocation_table(&analysis, app.settings.portfolio_value)
        .into_iter()
        .map(|r| {
            let drift_color = if r.drift > 0.0 {
                Color::LightRed
            } else if r.drift < 0.0 {
                Color::LightBlue
            } else {
                Color::White
            };
            Row::new(vec![
                Cell::from(r.ticker),
                Cell::from(format_pct(r.current_pct)),
                Cell::from(format_pct(r.target_pct)),
                Cell::from(format_pct(r.drift_pct)).style(Style::default().fg(drift_color)),
                Cell::from(format_grouped(r.dollars, 2)),
            ])
            .height(1)
        });

    let widths = [
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Min(14),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(2)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn render_history(f: &mut Frame, app: &App, area: Rect) {
    let title = date_title(app, "Allocation History (top holdings)", app.summary_date);
    let series = app.history();
    if series.is_empty() {
        return render_missing(f, area, title);
    }

    // Stacked: each line is the running total up to and including its ticker.
    let stacked = portfolio::stack_series(&series);
    let points: Vec<Vec<(f64, f64)>> = stacked
        .iter()
        .map(|layer| {
            layer
                .iter()
                .enumerate()
                .map(|(i, v)| (i as f64, *v))
                .collect()
        })
        .collect();

    let datasets: Vec<Dataset> = series
        .iter()
        .zip(points.iter())
        .enumerate()
        .map(|(i, (s, pts))| {
            Dataset::default()
                .name(s.ticker.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(series_color(i)))
                .data(pts)
        })
        .collect();

    let timestamps = app.table.timestamps();
    let x_max = timestamps.len().saturating_sub(1).max(1) as f64;
    let first = timestamps
        .first()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let last = timestamps
        .last()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(
            Axis::default()
                .title("Time")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(vec![Span::raw(first), Span::raw(last)]),
        )
        .y_axis(
            Axis::default()
                .title("Weight")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, 1.0])
                .labels(vec![Span::raw("0%"), Span::raw("50%"), Span::raw("100%")]),
        );
    f.render_widget(chart, area);
}

/// Left and right halves of a two-sided bar centred on zero. Drift beyond
/// `limit` is clipped; any non-zero drift shows at least one cell.
pub fn drift_bar(drift: f64, half_width: usize, limit: f64) -> (String, String) {
    let clipped = drift.clamp(-limit, limit);
    let mut len = ((clipped.abs() / limit) * half_width as f64).round() as usize;
    if drift != 0.0 {
        len = len.max(1);
    }
    let len = len.min(half_width);
    let bar = "█".repeat(len);
    if drift < 0.0 {
        (format!("{:>w$}", bar, w = half_width), " ".repeat(half_width))
    } else {
        (" ".repeat(half_width), format!("{:<w$}", bar, w = half_width))
    }
}

fn render_drift(f: &mut Frame, app: &App, area: Rect) {
    let title = date_title(app, "Drift Monitor", app.drift_date);
    let Some((_, analysis)) = app.analysis_at(app.drift_date) else {
        return render_missing(f, area, title);
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(32)])
        .split(area);

    let label_width = 10;
    let pct_width = 9;
    let inner_width = chunks[0].width.saturating_sub(2) as usize;
    let half_width = inner_width
        .saturating_sub(label_width + pct_width + 1)
        .max(2)
        / 2;

    let mut lines = vec![Line::from(Span::styled(
        format!(
            "{:<lw$}{:<hw$}0{:>hw$}",
            "",
            format!("-{:.0}%", DRIFT_AXIS_LIMIT * 100.0),
            format!("+{:.0}%", DRIFT_AXIS_LIMIT * 100.0),
            lw = label_width,
            hw = half_width,
        ),
        Style::default().fg(Color::DarkGray),
    ))];

    for bar in portfolio::drift_bars(&analysis.drift, app.drift_band) {
        let (left, right) = drift_bar(bar.drift, half_width, DRIFT_AXIS_LIMIT);
        let style = Style::default().fg(tier_color(bar.tier));
        lines.push(Line::from(vec![
            Span::raw(format!("{:<w$}", bar.ticker, w = label_width)),
            Span::styled(left, style),
            Span::styled("│", Style::default().fg(Color::White)),
            Span::styled(right, style),
            Span::styled(
                format!("{:>w$}", format_pct(bar.drift), w = pct_width),
                style,
            ),
        ]));
    }

    let monitor = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(monitor, chunks[0]);

    let mut legend = vec![
        Line::from(Span::styled(
            format!("Drift Threshold (±): {}", format_pct(app.drift_band)),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
    ];
    for (tier, count) in report::tier_counts(&analysis, app.drift_band) {
        legend.push(Line::from(vec![
            Span::styled("■ ", Style::default().fg(tier_color(tier))),
            Span::raw(format!("{} [{}]", tier.label(), count)),
        ]));
    }
    let legend = Paragraph::new(legend)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Tier key "));
    f.render_widget(legend, chunks[1]);
}

fn render_trades(f: &mut Frame, app: &App, area: Rect) {
    let title = date_title(app, "Trade Suggestions", app.trade_date);
    let Some((_, plan)) = app.trade_plan() else {
        return render_missing(f, area, title);
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let params = Paragraph::new(Line::from(vec![
        Span::styled("Trade Drift Band: ", Style::default().fg(Color::Gray)),
        Span::styled(format_pct(app.trade_band), Style::default().fg(Color::Yellow)),
        Span::raw("  |  "),
        Span::styled("Portfolio Value: ", Style::default().fg(Color::Gray)),
        Span::styled(format_money_whole(app.trade_value), Style::default().fg(Color::Yellow)),
        Span::raw("  |  "),
        Span::styled(
            if plan.is_empty() {
                "nothing to save".to_string()
            } else {
                format!("d: save {}", crate::config::TRADE_FILE_NAME)
            },
            Style::default().fg(Color::DarkGray),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(params, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let buy = Paragraph::new(report::buy_text(&plan))
        .style(Style::default().fg(Color::LightBlue))
        .block(Block::default().borders(Borders::ALL).title(" Buy "));
    let sell = Paragraph::new(report::sell_text(&plan))
        .style(Style::default().fg(Color::LightRed))
        .block(Block::default().borders(Borders::ALL).title(" Sell "));
    f.render_widget(buy, columns[0]);
    f.render_widget(sell, columns[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::data::tests::sample_table;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 40)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content().iter().map(|c| c.symbol()).collect()
    }

    fn app() -> App {
        App::new(Arc::new(sample_table()), Settings::default())
    }

    #[test]
    fn test_summary_screen() {
        let out = screen(&app());
        assert!(out.contains("2024-01-04"));
        assert!(out.contains("$50,000"));
        assert!(out.contains("Needs Rebalance"));
    }

    #[test]
    fn test_every_section_renders() {
        let mut app = app();
        for section in Section::ALL {
            app.section = section;
            let out = screen(&app);
            assert!(out.contains(section.title()), "missing title for {:?}", section);
        }
    }

    #[test]
    fn test_table_and_trades_content() {
        let mut app = app();
        app.section = Section::Table;
        let out = screen(&app);
        assert!(out.contains("60.00%"));
        assert!(out.contains("30,000.00"));

        app.section = Section::Trades;
        let out = screen(&app);
        assert!(out.contains("Buy $5,000.00 BBB"));
        assert!(out.contains("Sell $5,000.00 AAA"));

        app.trade_band = 0.10;
        let out = screen(&app);
        assert!(out.contains("No Buy suggestions."));
        assert!(out.contains("No Sell suggestions."));
    }

    #[test]
    fn test_drift_legend_lists_tiers() {
        let mut app = app();
        app.section = Section::Drift;
        let out = screen(&app);
        assert!(out.contains("Buy urgent"));
        assert!(out.contains("Sell minor"));
    }

    #[test]
    fn test_drift_bar_halves() {
        let (left, right) = drift_bar(-0.075, 10, 0.15);
        assert_eq!(left.chars().count(), 10);
        assert_eq!(left.trim_start(), "█████");
        assert_eq!(right.trim(), "");

        let (left, right) = drift_bar(0.5, 10, 0.15);
        assert_eq!(left.trim(), "");
        assert_eq!(right, "█".repeat(10));

        let (left, right) = drift_bar(0.0, 4, 0.15);
        assert_eq!(left, "    ");
        assert_eq!(right, "    ");

        let (_, right) = drift_bar(0.0001, 10, 0.15);
        assert_eq!(right.trim(), "█");
    }
}
