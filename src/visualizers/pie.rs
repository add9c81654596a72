// Animated donut chart of a post's poll results.
//
// Geometry and labeling follow the platform chart: segments sweep clockwise
// from 12 o'clock in answer order, weighted polls weigh by points, labels sit
// outside the ring at 1.5x the centroid, and an all-zero poll renders a gray
// full-circle placeholder instead of nothing.

use std::f64::consts::PI;
use std::time::Instant;

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Line as TextLine,
    widgets::{
        Block, Borders,
        canvas::{Canvas, Context, Line},
    },
};

use super::Visualizer;
use crate::post::Poll;

const OUTER_RADIUS: f64 = 90.0;
const ARC_WIDTH: f64 = 30.0;
const BOUND: f64 = 140.0;

/// Arcs sweep in over one second; labels surface once the sweep settles and
/// brighten over the second after that. Cosmetic ordering only.
const ARC_REVEAL_SECS: f64 = 1.0;
const LABEL_REVEAL_SECS: f64 = 2.0;

/// Segments under this share keep their ordinal label off the ring. Fixed,
/// not configurable.
const INDEX_LABEL_MIN_SHARE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentArc {
    /// Radians clockwise from 12 o'clock.
    pub start_angle: f64,
    pub end_angle: f64,
    /// Percent of the grand total.
    pub share: f64,
    /// Answer text, shown in the legend.
    pub text: String,
    pub value_label: String,
    pub percent_label: String,
    /// 1-based ordinal, suppressed for slivers.
    pub index_label: Option<String>,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieLayout {
    pub arcs: Vec<SegmentArc>,
    /// Grand total is zero: render the no-data ring instead of segments.
    pub placeholder: bool,
    pub center_total: String,
    pub center_caption: String,
}

/// Pure layout pass: everything the draw needs, computed once per dataset.
pub fn layout(poll: &Poll) -> PieLayout {
    let weighted = poll.weighted();
    let total = if weighted {
        poll.total_points
    } else {
        poll.total_votes
    };
    let center_count = if weighted {
        poll.total_users as f64
    } else {
        poll.total_votes
    };
    let center_total = trim_num(center_count);
    let center_caption = if center_count == 1.0 { "vote" } else { "votes" }.to_string();

    if total <= 0.0 {
        return PieLayout {
            arcs: Vec::new(),
            placeholder: true,
            center_total,
            center_caption,
        };
    }

    let count = poll.answers.len();
    let mut arcs = Vec::with_capacity(count);
    let mut angle = 0.0;
    for (i, answer) in poll.answers.iter().enumerate() {
        let weight = if weighted {
            answer.total_points
        } else {
            answer.total_votes
        };
        let share = weight / total * 100.0;
        let span = weight / total * 2.0 * PI;
        let value_label = if weight > 0.0 {
            let shown = if weighted {
                trim_num(answer.total_points / 100.0)
            } else {
                trim_num(answer.total_votes)
            };
            format!("{shown} ↑")
        } else {
            String::new()
        };
        let percent_label = if weight > 0.0 {
            format!("{share:.1}%")
        } else {
            String::new()
        };
        let index_label = (share >= INDEX_LABEL_MIN_SHARE).then(|| (i + 1).to_string());
        arcs.push(SegmentArc {
            start_angle: angle,
            end_angle: angle + span,
            share,
            text: answer.text.clone(),
            value_label,
            percent_label,
            index_label,
            color: viridis(i as f64 / count as f64),
        });
        angle += span;
    }

    PieLayout {
        arcs,
        placeholder: false,
        center_total,
        center_caption,
    }
}

/// Integer-valued numbers print without a trailing `.0`.
fn trim_num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Fixed five-stop approximation of the viridis ramp the platform charts
/// color segments with.
fn viridis(t: f64) -> Color {
    const STOPS: [(u8, u8, u8); 5] = [
        (0x44, 0x01, 0x54),
        (0x3b, 0x52, 0x8b),
        (0x21, 0x91, 0x8c),
        (0x5e, 0xc9, 0x62),
        (0xfd, 0xe7, 0x25),
    ];
    let scaled = t.clamp(0.0, 1.0) * (STOPS.len() - 1) as f64;
    let i = (scaled as usize).min(STOPS.len() - 2);
    let frac = scaled - i as f64;
    let (a, b) = (STOPS[i], STOPS[i + 1]);
    let lerp = |lo: u8, hi: u8| (lo as f64 + (hi as f64 - lo as f64) * frac).round() as u8;
    Color::Rgb(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

fn polar(angle: f64, radius: f64) -> (f64, f64) {
    // clockwise from 12 o'clock
    (angle.sin() * radius, angle.cos() * radius)
}

fn draw_ring(ctx: &mut Context, start: f64, end: f64, color: Color) {
    let inner = OUTER_RADIUS - ARC_WIDTH;
    let step = 0.01;
    let mut angle = start;
    while angle < end {
        let (x, y) = polar(angle, inner);
        let (ox, oy) = polar(angle, OUTER_RADIUS);
        ctx.draw(&Line {
            x1: x,
            y1: y,
            x2: ox,
            y2: oy,
            color,
        });
        angle += step;
    }
}

/// Owns one dataset's layout plus the reveal clock. A dataset change
/// discards everything and rebuilds; charts are small and redraws are driven
/// by vote updates, not frames, so there is nothing worth diffing.
pub struct PieChartVisualizer {
    layout: PieLayout,
    started: Instant,
}

impl PieChartVisualizer {
    pub fn new(poll: &Poll) -> Self {
        Self {
            layout: layout(poll),
            started: Instant::now(),
        }
    }

    pub fn set_poll(&mut self, poll: &Poll) {
        self.layout = layout(poll);
        self.started = Instant::now();
    }
}

impl Visualizer for PieChartVisualizer {
    fn name(&self) -> &str {
        "Poll Results"
    }

    fn draw(&mut self, f: &mut Frame, area: Rect) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let sweep = (elapsed / ARC_REVEAL_SECS).min(1.0) * 2.0 * PI;
        let label_style = if elapsed >= LABEL_REVEAL_SECS {
            Some(Style::default())
        } else if elapsed >= ARC_REVEAL_SECS {
            Some(Style::default().add_modifier(Modifier::DIM))
        } else {
            None
        };
        let chart = &self.layout;

        let canvas = Canvas::default()
            .block(
                Block::default()
                    .title(format!(" {} ", self.name()))
                    .borders(Borders::ALL),
            )
            .x_bounds([-BOUND, BOUND])
            .y_bounds([-BOUND, BOUND])
            .paint(|ctx| {
                if chart.placeholder {
                    draw_ring(ctx, 0.0, sweep, Color::Gray);
                }
                for arc in &chart.arcs {
                    if sweep <= arc.start_angle {
                        continue;
                    }
                    draw_ring(ctx, arc.start_angle, arc.end_angle.min(sweep), arc.color);
                }

                let Some(style) = label_style else { return };
                for arc in &chart.arcs {
                    let mid = (arc.start_angle + arc.end_angle) / 2.0;
                    let (cx, cy) = polar(mid, OUTER_RADIUS - ARC_WIDTH / 2.0);
                    if let Some(index) = &arc.index_label {
                        ctx.print(
                            cx,
                            cy,
                            TextLine::styled(
                                index.clone(),
                                style.patch(Style::default().fg(Color::White)),
                            ),
                        );
                    }
                    if !arc.value_label.is_empty() {
                        ctx.print(
                            cx * 1.5,
                            cy * 1.5 + 10.0,
                            TextLine::styled(
                                arc.value_label.clone(),
                                style.patch(Style::default().add_modifier(Modifier::BOLD)),
                            ),
                        );
                    }
                    if !arc.percent_label.is_empty() {
                        ctx.print(
                            cx * 1.5,
                            cy * 1.5 - 10.0,
                            TextLine::styled(arc.percent_label.clone(), style),
                        );
                    }
                }
                ctx.print(
                    0.0,
                    8.0,
                    TextLine::styled(
                        chart.center_total.clone(),
                        style.patch(Style::default().add_modifier(Modifier::BOLD)),
                    ),
                );
                ctx.print(
                    0.0,
                    -12.0,
                    TextLine::styled(chart.center_caption.clone(), style),
                );

                // legend in the bottom-left corner, one row per answer
                let rows = chart.arcs.len() as f64;
                for (i, arc) in chart.arcs.iter().enumerate() {
                    let y = -BOUND + 8.0 + (rows - 1.0 - i as f64) * 10.0;
                    ctx.print(
                        -BOUND + 4.0,
                        y,
                        TextLine::styled(
                            format!("{} · {}", i + 1, arc.text),
                            style.patch(Style::default().fg(arc.color)),
                        ),
                    );
                }
            });

        f.render_widget(canvas, area);
    }
}
