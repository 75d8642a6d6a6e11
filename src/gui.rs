use crate::app::{Command, Notice, NoticeLevel, SessionHandle};
use crate::chart::{Chart, LineKind, X_LABEL, Y_LABEL};
use crate::config::{AppConfig, DEFAULT_RANGE_DAYS};
use crate::data::DateRange;
use crate::live::{format_price_label, LiveFeed, LiveUpdate};
use chrono::{Duration, NaiveDate, TimeZone};
use eframe::egui;
use egui_extras::DatePickerButton;
use egui_plot::{Line, Plot, PlotPoints};
use std::collections::VecDeque;
use tokio::runtime::Handle;

// ──────────────────────────────────────────────────────────────────────────────
// Color Palette
// ──────────────────────────────────────────────────────────────────────────────

const ACCENT_BLUE: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
const ACCENT_GREEN: egui::Color32 = egui::Color32::from_rgb(34, 197, 94);
const ACCENT_RED: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);
const ACCENT_YELLOW: egui::Color32 = egui::Color32::from_rgb(250, 204, 21);
const ACCENT_ORANGE: egui::Color32 = egui::Color32::from_rgb(251, 146, 60);
const ACCENT_CYAN: egui::Color32 = egui::Color32::from_rgb(34, 211, 238);
const ACCENT_PURPLE: egui::Color32 = egui::Color32::from_rgb(168, 85, 247);

const BG_DARK: egui::Color32 = egui::Color32::from_rgb(15, 15, 20);
const BG_CARD: egui::Color32 = egui::Color32::from_rgb(24, 24, 32);
const BG_ELEVATED: egui::Color32 = egui::Color32::from_rgb(32, 32, 44);
const TEXT_PRIMARY: egui::Color32 = egui::Color32::from_rgb(226, 232, 240);
const TEXT_SECONDARY: egui::Color32 = egui::Color32::from_rgb(148, 163, 184);
const BORDER_SUBTLE: egui::Color32 = egui::Color32::from_rgb(51, 51, 68);

/// Line colors, cycled per series.
const SERIES_COLORS: [egui::Color32; 6] = [
    ACCENT_CYAN,
    ACCENT_YELLOW,
    ACCENT_PURPLE,
    ACCENT_GREEN,
    ACCENT_ORANGE,
    ACCENT_RED,
];

struct ChartWindow {
    id: u64,
    chart: Chart,
    open: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FeedStatus {
    Connecting,
    Connected,
    Reconnecting,
}

pub struct GuiApp {
    config: AppConfig,
    runtime: Handle,
    session: SessionHandle,
    symbol_input: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    /// Status line of the command in flight.
    busy: Option<&'static str>,
    notices: VecDeque<Notice>,
    charts: Vec<ChartWindow>,
    next_chart_id: u64,
    live: Option<LiveFeed>,
    live_price: Option<f64>,
    live_status: FeedStatus,
}

impl GuiApp {
    pub fn new(config: AppConfig, runtime: Handle, session: SessionHandle) -> Self {
        let today = chrono::Local::now().date_naive();
        Self {
            config,
            runtime,
            session,
            symbol_input: String::new(),
            start_date: today - Duration::days(DEFAULT_RANGE_DAYS),
            end_date: today,
            busy: None,
            notices: VecDeque::new(),
            charts: Vec::new(),
            next_chart_id: 0,
            live: None,
            live_price: None,
            live_status: FeedStatus::Connecting,
        }
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

    fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    fn dispatch(&mut self, command: Command, status: &'static str) {
        if self.session.send(command) {
            self.busy = Some(status);
        } else {
            self.notices.push_back(Notice {
                level: NoticeLevel::Error,
                title: "Error".to_string(),
                body: "The session has stopped; restart the application.".to_string(),
            });
        }
    }

    fn open_chart(&mut self, chart: Chart) {
        self.charts.push(ChartWindow {
            id: self.next_chart_id,
            chart,
            open: true,
        });
        self.next_chart_id += 1;
    }

    fn start_live_feed(&mut self, symbol: &str, ctx: &egui::Context) {
        let Some(template) = &self.config.live_url_template else {
            return;
        };
        let ctx = ctx.clone();
        // Replacing the feed drops and aborts the previous one.
        self.live = Some(LiveFeed::start(template, symbol, &self.runtime, move || {
            ctx.request_repaint()
        }));
        self.live_price = None;
        self.live_status = FeedStatus::Connecting;
    }

    fn poll_session(&mut self, ctx: &egui::Context) {
        while let Some(outcome) = self.session.try_recv() {
            self.busy = None;
            self.notices.extend(outcome.notices);
            if let Some(chart) = outcome.chart {
                self.open_chart(chart);
            }
            if let Some(symbol) = outcome.analyzed_symbol {
                self.start_live_feed(&symbol, ctx);
            }
        }
    }

    fn poll_live_feed(&mut self) {
        if let Some(feed) = &mut self.live {
            while let Some(update) = feed.try_recv() {
                match update {
                    LiveUpdate::Connected => self.live_status = FeedStatus::Connected,
                    LiveUpdate::Price(price) => self.live_price = Some(price),
                    LiveUpdate::Disconnected => self.live_status = FeedStatus::Reconnecting,
                }
            }
        }
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_theme(ctx);
        self.poll_session(ctx);
        self.poll_live_feed();

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.add_space(8.0);
                ui.label(egui::RichText::new("StockScope")
                    .size(18.0)
                    .strong()
                    .color(ACCENT_BLUE));
                ui.add_space(4.0);
                ui.label(egui::RichText::new("Stock Market Analysis and Prediction")
                    .size(11.0)
                    .color(TEXT_SECONDARY));
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_controls(ui);
        });

        self.render_chart_windows(ctx);
        self.render_notice(ctx);

        if self.busy.is_some() {
            ctx.request_repaint();
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Controls
// ──────────────────────────────────────────────────────────────────────────────

impl GuiApp {
    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let enabled = self.busy.is_none() && self.notices.is_empty();

        ui.add_space(16.0);
        ui.vertical_centered(|ui| {
            egui::Frame::none()
                .fill(BG_CARD)
                .rounding(egui::Rounding::same(12.0))
                .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
                .inner_margin(egui::Margin::same(24.0))
                .show(ui, |ui| {
                    ui.set_width(420.0);
                    ui.add_enabled_ui(enabled, |ui| {
                        ui.label(egui::RichText::new("Enter A Stock Symbol:")
                            .size(14.0)
                            .color(TEXT_SECONDARY));
                        ui.add_space(4.0);

                        let input_response = ui.add(
                            egui::TextEdit::singleline(&mut self.symbol_input)
                                .desired_width(380.0)
                                .font(egui::TextStyle::Heading)
                                .hint_text("e.g. NVDA, AAPL, SPY..."),
                        );
                        if input_response.lost_focus()
                            && ui.input(|i| i.key_pressed(egui::Key::Enter))
                        {
                            self.dispatch(
                                Command::Analyze {
                                    symbol: self.symbol_input.clone(),
                                    range: self.date_range(),
                                },
                                "Fetching market data...",
                            );
                        }

                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            if ui.button("Add to Portfolio").clicked() {
                                self.dispatch(
                                    Command::AddToPortfolio { symbol: self.symbol_input.clone() },
                                    "Updating portfolio...",
                                );
                            }
                            if ui.button("View Portfolio").clicked() {
                                self.dispatch(Command::ViewPortfolio, "Loading portfolio...");
                            }
                            if ui.button("Analyze Portfolio").clicked() {
                                self.dispatch(
                                    Command::AnalyzePortfolio { range: self.date_range() },
                                    "Fetching portfolio data...",
                                );
                            }
                        });

                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            ui.label("Start Date:");
                            ui.push_id("start_date", |ui| {
                                ui.add(DatePickerButton::new(&mut self.start_date));
                            });
                            ui.add_space(8.0);
                            ui.label("End Date:");
                            ui.push_id("end_date", |ui| {
                                ui.add(DatePickerButton::new(&mut self.end_date));
                            });
                        });

                        ui.add_space(12.0);
                        ui.horizontal(|ui| {
                            let analyze = ui.add_sized(
                                [186.0, 36.0],
                                egui::Button::new(egui::RichText::new("Analyze")
                                    .size(15.0)
                                    .strong()
                                    .color(egui::Color32::WHITE))
                                .fill(ACCENT_BLUE)
                                .rounding(egui::Rounding::same(8.0)),
                            );
                            if analyze.clicked() {
                                self.dispatch(
                                    Command::Analyze {
                                        symbol: self.symbol_input.clone(),
                                        range: self.date_range(),
                                    },
                                    "Fetching market data...",
                                );
                            }

                            let predict = ui.add_sized(
                                [186.0, 36.0],
                                egui::Button::new(egui::RichText::new("Predict")
                                    .size(15.0)
                                    .strong()
                                    .color(egui::Color32::WHITE))
                                .fill(ACCENT_PURPLE)
                                .rounding(egui::Rounding::same(8.0)),
                            );
                            if predict.clicked() {
                                self.dispatch(Command::Predict, "Fitting forecast model...");
                            }
                        });
                    });

                    ui.add_space(12.0);
                    self.render_live_label(ui);

                    if let Some(status) = self.busy {
                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label(egui::RichText::new(status).size(12.0).color(TEXT_SECONDARY));
                        });
                    }
                });
        });
    }

    fn render_live_label(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(format_price_label(self.live_price))
                .size(14.0)
                .strong()
                .color(TEXT_PRIMARY));
            if let Some(feed) = &self.live {
                let (text, color) = match self.live_status {
                    FeedStatus::Connecting => ("connecting", TEXT_SECONDARY),
                    FeedStatus::Connected => ("live", ACCENT_GREEN),
                    FeedStatus::Reconnecting => ("reconnecting", ACCENT_ORANGE),
                };
                ui.label(egui::RichText::new(format!("{} · {}", feed.symbol(), text))
                    .size(11.0)
                    .color(color));
            }
        });
    }

    fn render_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notices.front() else {
            return;
        };
        let mut dismissed = false;
        let color = match notice.level {
            NoticeLevel::Info => TEXT_PRIMARY,
            NoticeLevel::Error => ACCENT_RED,
        };

        egui::Window::new(notice.title.as_str())
            .id(egui::Id::new("notice_dialog"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_min_width(260.0);
                ui.label(egui::RichText::new(&notice.body).size(13.0).color(color));
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button("OK").clicked() || ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        dismissed = true;
                    }
                });
            });

        if dismissed {
            self.notices.pop_front();
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Charts
// ──────────────────────────────────────────────────────────────────────────────

fn format_timestamp(x: f64, pattern: &str) -> String {
    chrono::Utc.timestamp_opt(x as i64, 0)
        .map(|dt| dt.format(pattern).to_string())
        .single()
        .unwrap_or_default()
}

fn render_chart(ui: &mut egui::Ui, id: u64, chart: &Chart) {
    let plot = Plot::new(("chart", id))
        .legend(egui_plot::Legend::default().position(egui_plot::Corner::LeftTop))
        .x_axis_label(X_LABEL)
        .y_axis_label(Y_LABEL)
        .show_grid(true)
        .x_axis_formatter(|x, _range| format_timestamp(x.value, "%Y-%m-%d"))
        .label_formatter(|name, value| {
            let date = format_timestamp(value.x, "%Y-%m-%d");
            if name.is_empty() {
                format!("Date: {}\nPrice: ${:.2}", date, value.y)
            } else {
                format!("{}\nDate: {}\nPrice: ${:.2}", name, date, value.y)
            }
        })
        .allow_drag(true)
        .allow_zoom(true);

    plot.show(ui, |plot_ui| {
        for (i, line) in chart.lines.iter().enumerate() {
            let points = PlotPoints::new(line.points.clone());
            let mut plot_line = Line::new(points)
                .name(&line.name)
                .color(SERIES_COLORS[i % SERIES_COLORS.len()])
                .width(1.8);
            if line.kind == LineKind::Dashed {
                plot_line = plot_line.style(egui_plot::LineStyle::Dashed { length: 8.0 });
            }
            plot_ui.line(plot_line);
        }
    });
}

impl GuiApp {
    fn render_chart_windows(&mut self, ctx: &egui::Context) {
        for window in &mut self.charts {
            egui::Window::new(window.chart.title.as_str())
                .id(egui::Id::new(("chart_window", window.id)))
                .open(&mut window.open)
                .default_size([900.0, 480.0])
                .resizable(true)
                .show(ctx, |ui| render_chart(ui, window.id, &window.chart));
        }
        self.charts.retain(|w| w.open);
    }
}
