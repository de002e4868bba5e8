//! Terminal display of per-series send/receive rates
//!
//! One row per configured series with an inline sparkline, plus an
//! optional detail chart for the selected series.

#![allow(clippy::cast_precision_loss)] // Acceptable for chart coordinates
#![allow(clippy::cast_possible_truncation)] // Acceptable for UI values

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table},
    Frame,
};

use crate::config::TOTAL_SERIES;
use crate::history::SeriesHistory;
use crate::metrics::MetricsCollector;

/// Number of sparkline samples to show in the main table
const SPARKLINE_SAMPLES: usize = 20;

/// Display prefix of every series row
const SERIES_PREFIX: &str = "ib/";

#[derive(Debug, Default)]
pub(crate) struct AppState {
    pub(crate) selected_row: usize,
    pub(crate) detail_expanded: bool,
    pub(crate) frame_count: u64,
    row_count: usize,
}

impl AppState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn select_prev(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
    }

    pub(crate) fn select_next(&mut self) {
        if self.selected_row + 1 < self.row_count {
            self.selected_row += 1;
        }
    }

    pub(crate) fn toggle_detail(&mut self) {
        self.detail_expanded = !self.detail_expanded;
    }

    fn set_row_count(&mut self, rows: usize) {
        self.row_count = rows;
        if self.selected_row >= rows {
            self.selected_row = rows.saturating_sub(1);
        }
    }
}

/// Main draw function
pub(crate) fn draw(
    frame: &mut Frame,
    series: &[String],
    metrics: &MetricsCollector,
    hostname: &str,
    interval_secs: f64,
    state: &mut AppState,
) {
    state.frame_count += 1;
    state.set_row_count(series.len());

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(if state.detail_expanded {
            vec![Constraint::Percentage(50), Constraint::Percentage(50)]
        } else {
            vec![Constraint::Min(0)]
        })
        .split(frame.area());

    draw_main_table(frame, main_layout[0], series, metrics, hostname, state);

    if state.detail_expanded && main_layout.len() > 1 {
        draw_detail_panel(frame, main_layout[1], series, metrics, interval_secs, state);
    }
}

/// Header totals: the `total` series when configured, else the sum of rows
fn calculate_totals(series: &[String], metrics: &MetricsCollector) -> (f64, f64) {
    if series.iter().any(|name| name == TOTAL_SERIES) {
        return metrics
            .get_metrics(TOTAL_SERIES)
            .map_or((0.0, 0.0), |m| (m.sent_per_sec, m.received_per_sec));
    }

    series
        .iter()
        .filter_map(|name| metrics.get_metrics(name))
        .fold((0.0, 0.0), |(sent, received), m| {
            (sent + m.sent_per_sec, received + m.received_per_sec)
        })
}

#[allow(clippy::too_many_lines)]
fn draw_main_table(
    frame: &mut Frame,
    area: Rect,
    series: &[String],
    metrics: &MetricsCollector,
    hostname: &str,
    state: &AppState,
) {
    let (total_sent, total_received) = calculate_totals(series, metrics);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(2)])
        .split(area);

    let mut rows: Vec<Row> = Vec::new();

    if series.is_empty() {
        rows.push(Row::new(vec![
            Cell::from("No series configured").style(Style::default().fg(Color::Yellow)),
            Cell::from(""),
            Cell::from(""),
            Cell::from(""),
            Cell::from(""),
        ]));
    }

    for (row_idx, name) in series.iter().enumerate() {
        let is_selected = state.selected_row == row_idx;
        let series_metrics = metrics.get_metrics(name);
        let error = metrics.get_error(name);

        let (sent_rate, received_rate) = if let Some(m) = series_metrics {
            (
                format_bytes_per_sec(m.sent_per_sec),
                format_bytes_per_sec(m.received_per_sec),
            )
        } else {
            ("--".to_string(), "--".to_string())
        };

        let sparkline_str = if let Some(h) = metrics.get_history(name) {
            format!(
                " {} ",
                render_inline_sparkline(&h.combined_sparkline_data(SPARKLINE_SAMPLES))
            )
        } else {
            " ".repeat(SPARKLINE_SAMPLES + 2)
        };

        let (status, status_color) = match (error, series_metrics) {
            (Some(err), _) => (err.to_string(), Color::Red),
            (None, Some(_)) => {
                let pulse = if state.frame_count % 60 < 30 {
                    "●"
                } else {
                    "○"
                };
                (format!("{pulse} ok"), Color::Green)
            }
            (None, None) => ("collecting".to_string(), Color::DarkGray),
        };

        let row_style = if is_selected {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };

        let name_style = if name == TOTAL_SERIES {
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };

        rows.push(
            Row::new(vec![
                Cell::from(format!(" {SERIES_PREFIX}{name}")).style(name_style),
                Cell::from(sent_rate).style(Style::default().fg(Color::Magenta)),
                Cell::from(received_rate).style(Style::default().fg(Color::Blue)),
                Cell::from(sparkline_str).style(Style::default().fg(Color::Cyan)),
                Cell::from(status).style(Style::default().fg(status_color)),
            ])
            .style(row_style)
            .height(1),
        );
    }

    let widths = [
        Constraint::Length(16),                           // Series
        Constraint::Length(11),                           // Send
        Constraint::Length(11),                           // Recv
        Constraint::Length(SPARKLINE_SAMPLES as u16 + 4), // Sparkline (padded)
        Constraint::Min(10),                              // Status
    ];

    let header_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let table = Table::new(rows, widths)
        .header(
            Row::new(vec![
                Cell::from(" Series").style(header_style),
                Cell::from("Send").style(header_style),
                Cell::from("Recv").style(header_style),
                Cell::from("History").style(header_style),
                Cell::from("Status").style(header_style),
            ])
            .height(1)
            .bottom_margin(0),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Line::from(vec![
                    Span::styled(
                        " ibtraffic ",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled("@ ", Style::default().fg(Color::DarkGray)),
                    Span::styled(hostname, Style::default().fg(Color::White)),
                    Span::styled("  │  ", Style::default().fg(Color::DarkGray)),
                    Span::styled("▲ ", Style::default().fg(Color::Magenta)),
                    Span::styled(
                        format_bytes_per_sec(total_sent),
                        Style::default().fg(Color::Magenta),
                    ),
                    Span::styled("  ▼ ", Style::default().fg(Color::Blue)),
                    Span::styled(
                        format_bytes_per_sec(total_received),
                        Style::default().fg(Color::Blue),
                    ),
                    Span::styled(" ", Style::default()),
                ])),
        );

    frame.render_widget(table, chunks[0]);

    let help = Paragraph::new(Line::from(vec![
        Span::styled(" ", Style::default().fg(Color::DarkGray)),
        Span::styled("j/k", Style::default().fg(Color::Cyan)),
        Span::styled(" select  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Cyan)),
        Span::styled(
            if state.detail_expanded {
                " close  "
            } else {
                " details  "
            },
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled("r", Style::default().fg(Color::Cyan)),
        Span::styled(" refresh  ", Style::default().fg(Color::DarkGray)),
        Span::styled("q", Style::default().fg(Color::Cyan)),
        Span::styled(" quit ", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(help, chunks[1]);
}

fn draw_detail_panel(
    frame: &mut Frame,
    area: Rect,
    series: &[String],
    metrics: &MetricsCollector,
    interval_secs: f64,
    state: &AppState,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Line::from(vec![Span::styled(
            " Detail View ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]));

    let Some(name) = series.get(state.selected_row) else {
        let msg = Paragraph::new("Select a series to view details")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(msg, area);
        return;
    };

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let detail_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner);

    let history = metrics.get_history(name);

    let mut stats = vec![Span::styled(
        format!("{SERIES_PREFIX}{name} "),
        Style::default().fg(Color::Cyan),
    )];
    if let Some(m) = metrics.get_metrics(name) {
        stats.extend([
            Span::styled("| Send: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format_bytes_per_sec(m.sent_per_sec),
                Style::default().fg(Color::Magenta),
            ),
            Span::styled(" Recv: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format_bytes_per_sec(m.received_per_sec),
                Style::default().fg(Color::Blue),
            ),
        ]);
    }
    if let Some(h) = history {
        stats.extend([
            Span::styled(" Peak: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format_bytes_per_sec(h.peak_throughput()),
                Style::default().fg(Color::White),
            ),
        ]);
    }
    if let Some(err) = metrics.get_error(name) {
        stats.push(Span::styled(
            format!(" {err}"),
            Style::default().fg(Color::Red),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(stats)), detail_layout[0]);

    match history {
        Some(h) if !h.sent_per_sec.is_empty() => {
            draw_chart(frame, detail_layout[1], h, interval_secs);
        }
        _ => {
            let msg =
                Paragraph::new("Collecting data...").style(Style::default().fg(Color::DarkGray));
            frame.render_widget(msg, detail_layout[1]);
        }
    }
}

/// Auto-scale throughput value and return divisor with unit
fn auto_scale_throughput(bytes_per_sec: f64) -> (f64, &'static str) {
    if bytes_per_sec >= 1_000_000_000.0 {
        (1_000_000_000.0, "GB/s")
    } else if bytes_per_sec >= 1_000_000.0 {
        (1_000_000.0, "MB/s")
    } else if bytes_per_sec >= 1_000.0 {
        (1_000.0, "KB/s")
    } else {
        (1.0, "B/s")
    }
}

fn draw_chart(frame: &mut Frame, area: Rect, history: &SeriesHistory, interval_secs: f64) {
    let sent_raw: Vec<f64> = history.sent_per_sec.iter().copied().collect();
    let received_raw: Vec<f64> = history.received_per_sec.iter().copied().collect();

    let max_raw = sent_raw
        .iter()
        .chain(received_raw.iter())
        .copied()
        .fold(0.0_f64, f64::max)
        .max(0.001); // Avoid division by zero

    let (divisor, y_label) = auto_scale_throughput(max_raw);

    let sent_data: Vec<(f64, f64)> = sent_raw
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, v / divisor))
        .collect();
    let received_data: Vec<(f64, f64)> = received_raw
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, v / divisor))
        .collect();

    let max_scaled = max_raw / divisor;
    let x_max = sent_data.len() as f64;

    let datasets = vec![
        Dataset::default()
            .name("Send")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Magenta))
            .data(&sent_data),
        Dataset::default()
            .name("Recv")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Blue))
            .data(&received_data),
    ];

    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([0.0, x_max])
                .labels(vec![
                    Span::styled(
                        time_label(history.sent_per_sec.len(), interval_secs),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled("now", Style::default().fg(Color::White)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title(y_label)
                .style(Style::default().fg(Color::DarkGray))
                .bounds([0.0, max_scaled * 1.1])
                .labels(vec![
                    Span::raw("0"),
                    Span::styled(
                        format!("{max_scaled:.1}"),
                        Style::default().fg(Color::White),
                    ),
                ]),
        );

    frame.render_widget(chart, area);
}

/// How far back the oldest of `samples` points lies
fn time_label(samples: usize, interval_secs: f64) -> String {
    let time_span_secs = samples as f64 * interval_secs;
    if time_span_secs >= 60.0 {
        let mins = time_span_secs / 60.0;
        format!("{mins:.0}m ago")
    } else {
        format!("{time_span_secs:.0}s ago")
    }
}

/// Render an inline sparkline as Unicode characters
fn render_inline_sparkline(data: &[u64]) -> String {
    const SPARK_CHARS: &[char] = &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    data.iter()
        .map(|&v| SPARK_CHARS[(v as usize).min(7)])
        .collect()
}

pub(crate) fn format_bytes_per_sec(bytes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    let mut value = bytes_per_sec;
    let mut unit_index = 0;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if value < 0.1 {
        format!("{value:.2}{}", UNITS[unit_index])
    } else {
        format!("{value:.1}{}", UNITS[unit_index])
    }
}
