//! TUI layout and widget rendering.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Cell, Chart, Dataset, Paragraph, Row, Table};

use super::runtime::App;
use super::style;
use crate::devices::confidence_percent;

/// Renders the full TUI frame.
pub fn render(frame: &mut Frame, app: &App) {
    let table_height = app.trackers().len() as u16 + 3;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),            // header
            Constraint::Min(8),               // chart
            Constraint::Length(table_height), // device table
            Constraint::Length(5),            // status panel
            Constraint::Length(1),            // footer
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_chart(frame, app, chunks[1]);
    render_devices(frame, app, chunks[2]);
    render_status(frame, app, chunks[3]);
    render_footer(frame, chunks[4]);
}

/// Header bar: preset name, sample progress, speed, run state.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let (state_icon, state_label) = if app.is_finished() {
        ("■", "DONE")
    } else if app.paused {
        ("‖", "PAUSED")
    } else {
        ("▶", "RUNNING")
    };

    let header = Line::from(vec![
        Span::styled(
            " NILM ",
            Style::default()
                .fg(style::HEADER_FG)
                .bg(style::HEADER_BG)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            &app.preset_name,
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " │ n={}/{} │ {}ms │ {} {} ",
            app.timestep,
            app.total_steps,
            app.tick_interval_ms(),
            state_icon,
            state_label,
        )),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

/// Aggregate meter reading with attributed readings overlaid.
fn render_chart(frame: &mut Frame, app: &App, area: Rect) {
    let aggregate: Vec<(f64, f64)> = app
        .history
        .iter()
        .map(|r| (r.step as f64, r.aggregate_w))
        .collect();

    let attributed: Vec<(f64, f64)> = app
        .history
        .iter()
        .filter(|r| r.attributed.is_some())
        .map(|r| (r.step as f64, r.aggregate_w))
        .collect();

    let y_bounds = style::auto_bounds_y(&[aggregate.as_slice(), attributed.as_slice()]);

    let x_lo = aggregate.first().map_or(0.0, |p| p.0);
    let x_hi = aggregate.last().map_or(1.0, |p| p.0).max(x_lo + 1.0);

    let datasets = vec![
        Dataset::default()
            .name("Aggregate")
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(style::AGGREGATE_COLOR))
            .data(&aggregate),
        Dataset::default()
            .name("Attributed")
            .marker(symbols::Marker::Dot)
            .style(Style::default().fg(style::ATTRIBUTED_COLOR))
            .data(&attributed),
    ];

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(" Meter Power ")
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("sample")
                .bounds([x_lo, x_hi])
                .labels(vec![format!("{}", x_lo as u64), format!("{}", x_hi as u64)]),
        )
        .y_axis(
            Axis::default()
                .title("W")
                .bounds(y_bounds)
                .labels(vec![
                    format!("{:.0}", y_bounds[0]),
                    format!("{:.0}", y_bounds[1]),
                ]),
        );

    frame.render_widget(chart, area);
}

/// One row per tracked device.
fn render_devices(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(["Device", "State", "Power W", "Runtime", "kWh today", "Conf %"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = app.visible_trackers().map(|t| {
        let on = t.state().is_on();
        let color = if on { style::ON_COLOR } else { style::OFF_COLOR };
        let runtime = t.cumulative_runtime().as_secs();
        let confidence = confidence_percent(t.confidence());
        Row::new(vec![
            Cell::from(t.name().to_string()),
            Cell::from(if on { "ON" } else { "OFF" }),
            Cell::from(format!("{:.1}", t.smoothed_power())),
            Cell::from(format!(
                "{:02}:{:02}:{:02}",
                runtime / 3600,
                runtime / 60 % 60,
                runtime % 60
            )),
            Cell::from(format!("{:.3}", t.daily_energy_kwh())),
            Cell::from(format!("{confidence:.1}"))
                .style(Style::default().fg(style::confidence_color(confidence))),
        ])
        .style(Style::default().fg(color))
    });

    let table = Table::new(
        rows,
        [
            Constraint::Min(16),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(7),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(if app.show_on_only { " Devices (ON) " } else { " Devices " })
            .borders(Borders::ALL),
    );
    frame.render_widget(table, area);
}

/// Latest attribution and running scores.
fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = if let Some(r) = app.last_record() {
        let accuracy = app
            .tally
            .accuracy_pct()
            .map_or_else(|| "n/a".to_string(), |a| format!("{a:.1}%"));
        vec![
            Line::from(format!(
                "  reading={:>8.1} W  attributed={}  ({:.0}%)  truth={}",
                r.aggregate_w,
                r.attributed.as_deref().unwrap_or("-"),
                r.confidence * 100.0,
                r.truth.as_deref().unwrap_or("-"),
            )),
            Line::from(format!(
                "  accuracy={accuracy}  coverage={:.1}%",
                app.coverage_pct()
            )),
        ]
    } else {
        vec![Line::from("  Waiting for first reading...")]
    };
    if let Some(ref status) = app.status {
        lines.push(Line::from(Span::styled(
            format!("  {status}"),
            Style::default().fg(style::FOOTER_FG),
        )));
    }

    let block = Block::default().title(" Status ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Footer with keybinding hints.
fn render_footer(frame: &mut Frame, area: Rect) {
    let footer = Paragraph::new(Line::from(Span::styled(
        " q:Quit  Space:Pause  n:Step  +/-:Speed  1/2/3:Preset  r:Restart  t:Retrain  o:ON only",
        Style::default().fg(style::FOOTER_FG),
    )));
    frame.render_widget(footer, area);
}
