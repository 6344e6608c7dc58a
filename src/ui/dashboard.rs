//! Dashboard view
//!
//! Shows today's backend read usage against the ceiling, the projected cost,
//! the cached sites and the result of the last lookup.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::governor::UsageLevel;
use crate::service::Served;

/// Color for a usage level
pub fn level_color(level: UsageLevel) -> Color {
    match level {
        UsageLevel::Normal => Color::Green,
        UsageLevel::Caution => Color::Yellow,
        UsageLevel::Warning => Color::Red,
    }
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Renders the dashboard
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Usage gauge
            Constraint::Length(4), // Stats and costs
            Constraint::Min(5),    // Entries and last lookup
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_usage(frame, app, chunks[0]);
    render_stats(frame, app, chunks[1]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[2]);
    render_entries(frame, app, middle[0]);
    render_lookup(frame, app, middle[1]);

    render_input(frame, app, chunks[3]);
    render_status(frame, app, chunks[4]);
}

fn render_usage(frame: &mut Frame, app: &App, area: Rect) {
    let stats = app.stats();
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(" Backend reads today ")
                .borders(Borders::ALL),
        )
        .gauge_style(Style::default().fg(level_color(stats.level)))
        .ratio(stats.usage_ratio())
        .label(format!(
            "{} / {} ({:.0}%)",
            stats.daily_reads,
            stats.max_daily_reads,
            stats.usage_ratio() * 100.0
        ));
    frame.render_widget(gauge, area);
}

fn render_stats(frame: &mut Frame, app: &App, area: Rect) {
    let stats = app.stats();
    let costs = app.costs();
    let label = Style::default().fg(Color::DarkGray);

    let lines = vec![
        Line::from(vec![
            Span::styled("Cache: ", label),
            Span::raw(format!("{} / {} sites", stats.cache_size, stats.max_cache_size)),
        ]),
        Line::from(vec![
            Span::styled("Cost at ceiling: ", label),
            Span::raw(format!(
                "${:.4}/day  ${:.2}/month  ${:.2}/year",
                costs.daily, costs.monthly, costs.yearly
            )),
        ]),
    ];

    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

fn render_entries(frame: &mut Frame, app: &App, area: Rect) {
    let entries = app.entries();
    let items: Vec<ListItem> = entries
        .iter()
        .skip(app.entry_offset)
        .map(|entry| {
            let (marker, color) = if entry.is_fresh {
                ("fresh", Color::Green)
            } else {
                ("stale", Color::DarkGray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<6}", marker), Style::default().fg(color)),
                Span::raw(format!("{:<24}", entry.key)),
                Span::styled(format_age(entry.age), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Cached sites ({}) ", entries.len()))
            .borders(Borders::ALL),
    );
    frame.render_widget(list, area);
}

fn render_lookup(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().title(" Last lookup ").borders(Borders::ALL);

    let Some(outcome) = &app.last_lookup else {
        let hint = Paragraph::new("Type a slug and press Enter")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(hint, area);
        return;
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(
            outcome.slug.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", outcome.at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    match &outcome.resolved {
        None => lines.push(Line::from(Span::styled(
            "Unavailable",
            Style::default().fg(Color::Red),
        ))),
        Some(resolved) => {
            let served_color = match resolved.served {
                Served::Cache => Color::Green,
                Served::Backend => Color::Cyan,
                Served::Stale => Color::Yellow,
            };
            let business = &resolved.site.business;
            lines.push(Line::from(vec![
                Span::raw(format!("{} ({}) ", business.name, business.town)),
                Span::styled(resolved.served.as_str(), Style::default().fg(served_color)),
            ]));
            if resolved.needs_redirect() {
                lines.push(Line::from(Span::styled(
                    format!("Redirect to /{}", resolved.canonical_slug),
                    Style::default().fg(Color::Yellow),
                )));
            }
            lines.push(Line::from(""));
            for item in &resolved.site.items {
                lines.push(Line::from(format!(
                    "  {:<20} {:>8.2}  {}",
                    item.name,
                    item.price,
                    item.kind.as_str()
                )));
            }
            if resolved.site.items.is_empty() {
                lines.push(Line::from(Span::styled(
                    "  No items",
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
    }

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let input = Paragraph::new(Line::from(vec![
        Span::styled("/", Style::default().fg(Color::DarkGray)),
        Span::raw(app.input.as_str()),
        Span::styled("_", Style::default().fg(Color::Cyan)),
    ]))
    .block(Block::default().title(" Slug ").borders(Borders::ALL));
    frame.render_widget(input, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let text = match &app.status {
        Some(status) => status.clone(),
        None => "Enter: resolve  Ctrl-x: clear cache  ?: help  Esc: quit".to_string(),
    };
    let status = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, area);
}
