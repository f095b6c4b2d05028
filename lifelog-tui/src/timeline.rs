//! Lane widget.
//!
//! Every lane is drawn against one shared time axis: timeline lanes as
//! stacked bars and points, graph lanes as columns of block characters.
//! Failed chunks show inline as red shaded spans.

use chrono::Duration;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::{Block, Borders, Widget},
};

use crate::range::{Range, Timestamp};
use crate::records::{DisplayRecord, GraphHints, GraphStyle, LaneData, TimelineHints, ERROR_TITLE};
use crate::theme::{colors, get_lane_color, styles};
use crate::view::LaneState;

/// Width of the lane-name column
pub const NAME_WIDTH: u16 = 18;
/// Columns between axis labels
const TICK_SPACING: u16 = 16;
/// Rows a single lane may take
const MAX_LANE_HEIGHT: u16 = 4;

const BLOCK_FULL: char = '█';
const BLOCK_LEFT: char = '▌';
const EVENT_POINT: char = '●';
const SHADE: char = '░';
const ERROR_MARK: char = '✗';
const BAR_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPINNER: [char; 4] = ['◐', '◓', '◑', '◒'];

/// Maps instants onto the columns of a fixed-width strip
#[derive(Debug, Clone, Copy)]
pub struct Axis {
    window: Range,
    width: u16,
}

impl Axis {
    pub fn new(window: Range, width: u16) -> Self {
        Self { window, width }
    }

    fn span_ms(&self) -> i64 {
        self.window.duration().num_milliseconds().max(1)
    }

    /// Column of `t`; may fall outside `0..width`
    pub fn column(&self, t: Timestamp) -> i64 {
        let offset = (t - self.window.start()).num_milliseconds();
        (i128::from(offset) * i128::from(self.width)).div_euclid(i128::from(self.span_ms())) as i64
    }

    /// Visible columns covered by `[start, end)`, at least one wide
    pub fn span(&self, start: Timestamp, end: Timestamp) -> Option<(u16, u16)> {
        let first = self.column(start);
        let last = (self.column(end) - 1).max(first);
        if last < 0 || first >= i64::from(self.width) {
            return None;
        }
        Some((first.max(0) as u16, last.min(i64::from(self.width) - 1) as u16))
    }

    /// Instant at the left edge of `column`
    pub fn instant(&self, column: u16) -> Timestamp {
        let ms = self.span_ms() * i64::from(column) / i64::from(self.width.max(1));
        self.window.start() + Duration::milliseconds(ms)
    }

    /// Axis label pattern suited to the window width
    pub fn label_format(&self) -> &'static str {
        let days = self.window.duration().num_days();
        if days <= 3 {
            "%-d %b %H:%M"
        } else if days <= 90 {
            "%-d %b"
        } else if days <= 3 * 365 {
            "%b %y"
        } else {
            "%Y"
        }
    }
}

/// Per-column maxima of a graph lane; `None` where nothing was sampled
fn column_values(records: &[DisplayRecord], axis: &Axis) -> (Vec<Option<f64>>, Vec<bool>) {
    let width = usize::from(axis.width);
    let mut values: Vec<Option<f64>> = vec![None; width];
    let mut errors = vec![false; width];

    for record in records {
        let end = record.end.unwrap_or(record.start);
        let Some((first, last)) = axis.span(record.start, end) else {
            continue;
        };
        for col in usize::from(first)..=usize::from(last) {
            if record.is_error {
                errors[col] = true;
            } else if let Some(y) = record.value() {
                values[col] = Some(values[col].map_or(y, |v: f64| v.max(y)));
            }
        }
    }
    (values, errors)
}

/// All lanes over the current window
pub struct TimelineWidget<'a> {
    lanes: &'a [LaneState],
    window: Range,
    now: Timestamp,
    selected: usize,
    frame: u64,
    title: String,
}

impl<'a> TimelineWidget<'a> {
    pub fn new(lanes: &'a [LaneState], window: Range, now: Timestamp) -> Self {
        Self {
            lanes,
            window,
            now,
            selected: 0,
            frame: 0,
            title: format!(" {window} "),
        }
    }

    pub fn selected(mut self, selected: usize) -> Self {
        self.selected = selected;
        self
    }

    /// Animation frame, drives the loading spinner
    pub fn frame(mut self, frame: u64) -> Self {
        self.frame = frame;
        self
    }

    fn render_time_axis(&self, area: Rect, buf: &mut Buffer, axis: &Axis) {
        let format = axis.label_format();
        let mut col = 0;
        while col < area.width {
            let label = axis.instant(col).format(format).to_string();
            if col + label.chars().count() as u16 <= area.width {
                buf.set_string(area.x + col, area.y, &label, styles::text_dim());
            }
            col += TICK_SPACING;
        }

        for col in 0..area.width {
            let symbol = if col % TICK_SPACING == 0 { '┬' } else { '─' };
            buf[(area.x + col, area.y + 1)]
                .set_char(symbol)
                .set_style(Style::default().fg(colors::BORDER));
        }

        if let Some((now_col, _)) = axis.span(self.now, self.now) {
            buf[(area.x + now_col, area.y + 1)]
                .set_char('▼')
                .set_style(Style::default().fg(colors::NOW_MARKER).add_modifier(Modifier::BOLD));
        }
    }

    fn render_lane_label(&self, area: Rect, buf: &mut Buffer, lane: &LaneState, index: usize) {
        let is_selected = index == self.selected;
        let color = get_lane_color(index);

        if is_selected {
            for x in area.x..area.x + area.width {
                for y in area.y..area.y + area.height {
                    buf[(x, y)].set_bg(colors::BG_HIGHLIGHT);
                }
            }
        }

        let prefix = if is_selected { '▸' } else { '│' };
        buf.set_string(area.x, area.y, prefix.to_string(), Style::default().fg(color));

        let name_style = if is_selected {
            Style::default().fg(color).add_modifier(Modifier::BOLD)
        } else {
            styles::text()
        };
        let name_width = usize::from(NAME_WIDTH.saturating_sub(4));
        buf.set_stringn(area.x + 1, area.y, lane.group(), name_width, name_style);

        let status_x = area.x + NAME_WIDTH.saturating_sub(2);
        if lane.is_loading() {
            let spinner = SPINNER[(self.frame / 3) as usize % SPINNER.len()];
            buf.set_string(status_x, area.y, spinner.to_string(), styles::warning());
        } else if lane.data().is_some_and(|data| data.error_count() > 0) {
            buf.set_string(status_x, area.y, ERROR_MARK.to_string(), styles::error_record());
        }
    }

    fn render_error_span(&self, area: Rect, buf: &mut Buffer, row: u16, first: u16, last: u16) {
        let style = styles::error_record();
        for col in first..=last {
            buf[(area.x + col, area.y + row)].set_char(SHADE).set_style(style);
        }
        buf[(area.x + first, area.y + row)].set_char(ERROR_MARK);
        let room = usize::from(last - first);
        if room > 2 {
            buf.set_stringn(area.x + first + 2, area.y + row, ERROR_TITLE, room - 1, style);
        }
    }

    fn render_timeline_lane(
        &self,
        area: Rect,
        buf: &mut Buffer,
        records: &[DisplayRecord],
        hints: TimelineHints,
        axis: &Axis,
        index: usize,
    ) {
        let color = get_lane_color(index);
        for (i, record) in records.iter().enumerate() {
            let end = record.end.unwrap_or(record.start);
            let Some((first, last)) = axis.span(record.start, end) else {
                continue;
            };
            let row = if hints.stack {
                (i % usize::from(area.height)) as u16
            } else {
                0
            };

            if record.is_error {
                self.render_error_span(area, buf, row, first, last);
                continue;
            }

            if record.end.is_none() || first == last {
                buf[(area.x + first, area.y + row)]
                    .set_char(EVENT_POINT)
                    .set_style(Style::default().fg(color));
                continue;
            }

            for col in first..=last {
                let symbol = if col == first { BLOCK_LEFT } else { BLOCK_FULL };
                buf[(area.x + col, area.y + row)]
                    .set_char(symbol)
                    .set_style(Style::default().fg(color));
            }
            let room = usize::from(last - first);
            if room > 3 {
                let label_style = Style::default().fg(colors::BG_DARK).bg(color);
                buf.set_stringn(area.x + first + 1, area.y + row, &record.content, room - 1, label_style);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_graph_lane(
        &self,
        area: Rect,
        buf: &mut Buffer,
        records: &[DisplayRecord],
        hints: GraphHints,
        y_max: f64,
        axis: &Axis,
        index: usize,
    ) {
        let color = get_lane_color(index);
        let (values, errors) = column_values(records, axis);
        let levels = usize::from(area.height) * 8;

        for col in 0..area.width {
            let bottom = area.y + area.height - 1;
            if errors[usize::from(col)] {
                let first = col == 0 || !errors[usize::from(col) - 1];
                buf[(area.x + col, bottom)]
                    .set_char(if first { ERROR_MARK } else { SHADE })
                    .set_style(styles::error_record());
                continue;
            }

            let Some(value) = values[usize::from(col)] else {
                continue;
            };
            if y_max <= 0.0 {
                continue;
            }
            let filled = ((value / y_max).clamp(0.0, 1.0) * levels as f64).round() as usize;
            if filled == 0 {
                continue;
            }
            let full_rows = filled / 8;
            let partial = filled % 8;
            let top = (filled - 1) / 8;

            for from_bottom in 0..=top {
                if hints.style == GraphStyle::Line && from_bottom != top {
                    continue;
                }
                let symbol = if from_bottom < full_rows {
                    BAR_LEVELS[8]
                } else {
                    BAR_LEVELS[partial]
                };
                buf[(area.x + col, bottom - from_bottom as u16)]
                    .set_char(symbol)
                    .set_style(Style::default().fg(color));
            }
        }
    }

    fn render_now_line(&self, area: Rect, buf: &mut Buffer, axis: &Axis) {
        let Some((col, _)) = axis.span(self.now, self.now) else {
            return;
        };
        for row in 0..area.height {
            let cell = &mut buf[(area.x + col, area.y + row)];
            if cell.symbol() == " " {
                cell.set_char('│')
                    .set_style(Style::default().fg(colors::NOW_MARKER).add_modifier(Modifier::DIM));
            }
        }
    }
}

impl Widget for TimelineWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(self.title.as_str())
            .title_style(Style::default().fg(colors::PURPLE).add_modifier(Modifier::BOLD))
            .borders(Borders::ALL)
            .border_style(styles::border())
            .style(Style::default().bg(colors::BG_DARK));

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width < NAME_WIDTH + 10 || inner.height < 3 || self.lanes.is_empty() {
            return;
        }

        let plot_width = inner.width - NAME_WIDTH;
        let axis = Axis::new(self.window, plot_width);
        self.render_time_axis(Rect::new(inner.x + NAME_WIDTH, inner.y, plot_width, 2), buf, &axis);

        let lanes_area = Rect::new(inner.x, inner.y + 2, inner.width, inner.height - 2);
        let lane_height = (lanes_area.height / self.lanes.len() as u16).clamp(1, MAX_LANE_HEIGHT);

        for (index, lane) in self.lanes.iter().enumerate() {
            let y = lanes_area.y + index as u16 * lane_height;
            if y + lane_height > lanes_area.y + lanes_area.height {
                break;
            }
            let label_area = Rect::new(lanes_area.x, y, lanes_area.width, lane_height);
            let plot_area = Rect::new(lanes_area.x + NAME_WIDTH, y, plot_width, lane_height);

            self.render_lane_label(label_area, buf, lane, index);
            match lane.data() {
                Some(LaneData::Timeline { records, hints }) => {
                    self.render_timeline_lane(plot_area, buf, records, *hints, &axis, index)
                }
                Some(LaneData::Graph { records, hints }) => {
                    self.render_graph_lane(plot_area, buf, records, *hints, lane.y_max, &axis, index)
                }
                None => {}
            }
        }

        self.render_now_line(Rect::new(inner.x + NAME_WIDTH, lanes_area.y, plot_width, lanes_area.height), buf, &axis);

        buf.set_string(area.x + 1, area.y + area.height - 1, "◀ h", styles::text_hint());
        buf.set_string(
            area.x + area.width.saturating_sub(4),
            area.y + area.height - 1,
            "l ▶",
            styles::text_hint(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn axis() -> Axis {
        Axis::new(
            Range::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap(),
            )
            .unwrap(),
            100,
        )
    }

    #[test]
    fn test_axis_columns() {
        let axis = axis();
        assert_eq!(axis.column(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()), 0);
        assert_eq!(axis.column(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap()), 50);
        assert_eq!(axis.column(Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap()), -10);
        assert_eq!(axis.instant(50), Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap());
        assert_eq!(axis.label_format(), "%-d %b");
    }

    #[test]
    fn test_axis_span_clips_to_strip() {
        let axis = axis();
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        assert_eq!(axis.span(day(2), day(3)), Some((10, 19)));
        assert_eq!(axis.span(day(3), day(3)), Some((20, 20)));
        assert_eq!(
            axis.span(Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(), day(2)),
            Some((0, 9))
        );
        assert_eq!(axis.span(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), day(2)), None);
    }

    fn rows_with_points(hints: TimelineHints) -> Vec<u16> {
        let axis = axis();
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let records: Vec<DisplayRecord> = (2..5)
            .map(|d| DisplayRecord::event("Music", "track", "track", day(d), None))
            .collect();

        let area = Rect::new(0, 0, 100, 3);
        let mut buf = Buffer::empty(area);
        TimelineWidget::new(&[], axis.window, day(1)).render_timeline_lane(area, &mut buf, &records, hints, &axis, 0);

        (0..area.height)
            .filter(|&y| (0..area.width).any(|x| buf[(x, y)].symbol() == "●"))
            .collect()
    }

    #[test]
    fn test_stacking_follows_hints() {
        assert_eq!(rows_with_points(TimelineHints::default()), vec![0, 1, 2]);
        assert_eq!(rows_with_points(TimelineHints { stack: false }), vec![0]);
    }

    #[test]
    fn test_column_values_keep_maxima_and_errors() {
        let axis = axis();
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let records = vec![
            DisplayRecord::sample("Steps", "", "", day(2), Some(day(3)), Some(4.0)),
            DisplayRecord::sample("Steps", "", "", day(2), Some(day(3)), Some(9.0)),
            DisplayRecord::error(
                "Steps",
                "HTTP 500",
                Range::new(day(5), day(6)).unwrap(),
                crate::records::LaneShape::Graph,
            ),
        ];
        let (values, errors) = column_values(&records, &axis);
        assert_eq!(values[15], Some(9.0));
        assert_eq!(values[30], None);
        assert!(errors[45]);
        assert!(!errors[15]);
    }
}
