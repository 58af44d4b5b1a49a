use crate::config::{self, Settings, BAND_STEP, HISTORY_TOP_N, VALUE_STEP};
use crate::data::WeightTable;
use crate::portfolio::{self, HistorySeries, SnapshotAnalysis, TradePlan};
use crate::report;
use chrono::NaiveDate;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Summary,
    Pie,
    Table,
    History,
    Drift,
    Trades,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Summary,
        Section::Pie,
        Section::Table,
        Section::History,
        Section::Drift,
        Section::Trades,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Pie => "Allocation Pie",
            Self::Table => "Allocation Table",
            Self::History => "Allocation History",
            Self::Drift => "Drift Monitor",
            Self::Trades => "Trade Suggestions",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

/// One dashboard session. Each section keeps its own date selection, like
/// independent sliders on a page; history follows the summary date.
pub struct App {
    pub table: Arc<WeightTable>,
    pub settings: Settings,
    pub should_quit: bool,
    pub section: Section,
    pub summary_date: usize,
    pub pie_date: usize,
    pub table_date: usize,
    pub drift_date: usize,
    pub trade_date: usize,
    pub drift_band: f64,
    pub trade_band: f64,
    pub trade_value: f64,
    pub status_msg: Option<String>,
    pub error_msg: Option<String>,
}

impl App {
    /// Every date selector starts on the latest date.
    pub fn new(table: Arc<WeightTable>, settings: Settings) -> Self {
        let latest = table.dates().len().saturating_sub(1);
        Self {
            drift_band: settings.drift_band,
            trade_band: settings.drift_band,
            trade_value: settings.portfolio_value,
            table,
            settings,
            should_quit: false,
            section: Section::Summary,
            summary_date: latest,
            pie_date: latest,
            table_date: latest,
            drift_date: latest,
            trade_date: latest,
            status_msg: None,
            error_msg: None,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.table.dates()
    }

    pub fn date_at(&self, idx: usize) -> Option<NaiveDate> {
        self.table.dates().get(idx).copied()
    }

    /// Fresh targets and drift for the selected date.
    pub fn analysis_at(&self, idx: usize) -> Option<(NaiveDate, SnapshotAnalysis)> {
        let date = self.date_at(idx)?;
        let snapshot = self.table.snapshot_on(date)?;
        debug!("Recomputing allocation for {}", date);
        Some((date, SnapshotAnalysis::new(snapshot)))
    }

    pub fn history(&self) -> Vec<HistorySeries> {
        self.analysis_at(self.summary_date)
            .map(|(_, a)| portfolio::allocation_history(&self.table, &a.current, HISTORY_TOP_N))
            .unwrap_or_default()
    }

    pub fn trade_plan(&self) -> Option<(NaiveDate, TradePlan)> {
        let (date, analysis) = self.analysis_at(self.trade_date)?;
        Some((date, analysis.trades(self.trade_band, self.trade_value)))
    }

    fn selected_date_mut(&mut self) -> &mut usize {
        match self.section {
            Section::Summary | Section::History => &mut self.summary_date,
            Section::Pie => &mut self.pie_date,
            Section::Table => &mut self.table_date,
            Section::Drift => &mut self.drift_date,
            Section::Trades => &mut self.trade_date,
        }
    }

    pub fn selected_date(&self) -> usize {
        match self.section {
            Section::Summary | Section::History => self.summary_date,
            Section::Pie => self.pie_date,
            Section::Table => self.table_date,
            Section::Drift => self.drift_date,
            Section::Trades => self.trade_date,
        }
    }

    pub fn shift_date(&mut self, delta: isize) {
        let last = self.table.dates().len().saturating_sub(1);
        let current = self.selected_date_mut();
        *current = current.saturating_add_signed(delta).min(last);
    }

    pub fn first_date(&mut self) {
        *self.selected_date_mut() = 0;
    }

    pub fn last_date(&mut self) {
        let last = self.table.dates().len().saturating_sub(1);
        *self.selected_date_mut() = last;
    }

    /// Moves the band of the active section (drift monitor or trades) by whole steps.
    pub fn shift_band(&mut self, steps: i32) {
        let band = match self.section {
            Section::Drift => &mut self.drift_band,
            Section::Trades => &mut self.trade_band,
            _ => return,
        };
        let snapped = (*band / BAND_STEP).round() + steps as f64;
        *band = config::clamp_band(snapped * BAND_STEP);
    }

    pub fn shift_value(&mut self, steps: i32) {
        if self.section != Section::Trades {
            return;
        }
        self.trade_value = config::clamp_value(self.trade_value + steps as f64 * VALUE_STEP);
    }

    pub fn next_section(&mut self) {
        let i = self.section.index();
        self.section = Section::ALL[(i + 1) % Section::ALL.len()];
    }

    pub fn previous_section(&mut self) {
        let i = self.section.index();
        self.section = Section::ALL[(i + Section::ALL.len() - 1) % Section::ALL.len()];
    }

    /// Writes the current trade list into the export directory.
    pub fn save_trades(&mut self) -> Option<PathBuf> {
        let Some((_, plan)) = self.trade_plan() else {
            return None;
        };
        match report::export_trades(&plan, &self.settings.export_dir) {
            Ok(Some(path)) => {
                self.status_msg = Some(format!("Saved {}", path.display()));
                self.error_msg = None;
                Some(path)
            }
            Ok(None) => {
                self.status_msg = Some("No trade suggestions to save".to_string());
                None
            }
            Err(e) => {
                error!("Export failed: {:#}", e);
                self.error_msg = Some(format!("{:#}", e));
                None
            }
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::Down | KeyCode::Char('j') => self.next_section(),
            KeyCode::BackTab | KeyCode::Up | KeyCode::Char('k') => self.previous_section(),
            KeyCode::Right | KeyCode::Char('l') => self.shift_date(1),
            KeyCode::Left | KeyCode::Char('h') => self.shift_date(-1),
            KeyCode::Home => self.first_date(),
            KeyCode::End => self.last_date(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.shift_band(1),
            KeyCode::Char('-') => self.shift_band(-1),
            KeyCode::Char(']') => self.shift_value(1),
            KeyCode::Char('[') => self.shift_value(-1),
            KeyCode::Char('d') if self.section == Section::Trades => {
                self.save_trades();
            }
            KeyCode::Char(c) if ('1'..='6').contains(&c) => {
                let idx = c as usize - '1' as usize;
                self.section = Section::ALL[idx];
            }
            _ => {}
        }
    }

    pub fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        while !self.should_quit {
            terminal.draw(|f| crate::ui::render(f, self))?;

            if event::poll(std::time::Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::sample_table;

    fn app() -> App {
        App::new(Arc::new(sample_table()), Settings::default())
    }

    #[test]
    fn test_starts_on_latest_date() {
        let app = app();
        assert_eq!(app.summary_date, 2);
        assert_eq!(app.trade_date, 2);
        assert_eq!(app.date_at(app.summary_date).unwrap().to_string(), "2024-01-04");
    }

    #[test]
    fn test_date_selection_is_per_section_and_clamped() {
        let mut app = app();
        app.section = Section::Pie;
        app.shift_date(-1);
        app.shift_date(-5);
        assert_eq!(app.pie_date, 0);
        assert_eq!(app.summary_date, 2);

        app.shift_date(10);
        assert_eq!(app.pie_date, 2);

        app.handle_key(KeyCode::Home);
        assert_eq!(app.pie_date, 0);
        app.handle_key(KeyCode::End);
        assert_eq!(app.pie_date, 2);
    }

    #[test]
    fn test_band_steps_and_bounds() {
        let mut app = app();
        app.section = Section::Drift;
        app.shift_band(1);
        assert!((app.drift_band - 0.025).abs() < 1e-12);
        assert!((app.trade_band - 0.02).abs() < 1e-12);

        for _ in 0..100 {
            app.shift_band(1);
        }
        assert_eq!(app.drift_band, config::BAND_MAX);
        for _ in 0..100 {
            app.shift_band(-1);
        }
        assert_eq!(app.drift_band, config::BAND_MIN);

        app.section = Section::Summary;
        app.shift_band(1);
        assert_eq!(app.drift_band, config::BAND_MIN);
    }

    #[test]
    fn test_value_only_moves_on_trades() {
        let mut app = app();
        app.shift_value(1);
        assert_eq!(app.trade_value, 50_000.0);

        app.section = Section::Trades;
        app.handle_key(KeyCode::Char(']'));
        assert_eq!(app.trade_value, 50_500.0);
        app.trade_value = 200.0;
        app.handle_key(KeyCode::Char('['));
        assert_eq!(app.trade_value, 0.0);
    }

    #[test]
    fn test_section_navigation_wraps() {
        let mut app = app();
        app.previous_section();
        assert_eq!(app.section, Section::Trades);
        app.next_section();
        assert_eq!(app.section, Section::Summary);
        app.handle_key(KeyCode::Char('5'));
        assert_eq!(app.section, Section::Drift);
    }

    #[test]
    fn test_trade_plan_recomputes_from_selection() {
        let mut app = app();
        // 2024-01-04: AAA 0.60 / BBB 0.40 / Cash 0 -> +-0.10 drift.
        let (_, plan) = app.trade_plan().unwrap();
        assert_eq!(plan.buys.len(), 1);
        assert_eq!(plan.sells.len(), 1);

        app.trade_band = 0.10;
        let (_, plan) = app.trade_plan().unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_save_trades_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            export_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let mut app = App::new(Arc::new(sample_table()), settings);
        app.section = Section::Trades;
        app.handle_key(KeyCode::Char('d'));
        let path = dir.path().join(config::TRADE_FILE_NAME);
        assert!(path.exists());
        assert!(app.status_msg.unwrap().starts_with("Saved"));
    }

    #[test]
    fn test_history_follows_summary_date() {
        let app = app();
        let history = app.history();
        assert_eq!(history[0].ticker, "AAA");
        assert_eq!(history[0].weights.len(), 3);
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app();
        app.handle_key(KeyCode::Char('q'));
        assert!(app.should_quit);
    }
}
