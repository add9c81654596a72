use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    widgets::{
        Block, Borders,
        canvas::{Canvas, Line},
    },
};

use super::Visualizer;
use crate::audio::analyser::Analyser;

pub const NUM_BARS: usize = 60;
pub const MAX_BAR_HEIGHT: f64 = 20.0;

const BAR_FILL: Color = Color::Rgb(0xcb, 0xd8, 0xff);

/// Live frequency-spectrum histogram for the playing bead: 60 bars mirrored
/// around the midline, each scaled from the analyser's 0-255 energy bytes.
///
/// Attach/detach is the renderer's whole lifecycle: while attached, every
/// `draw` samples the analyser once; detached it renders a flat baseline and
/// holds no reference to the audio path.
pub struct SpectrumVisualizer {
    analyser: Option<Analyser>,
    bytes: Vec<u8>,
    title: String,
}

impl SpectrumVisualizer {
    pub fn new() -> Self {
        Self {
            analyser: None,
            bytes: Vec::new(),
            title: String::new(),
        }
    }

    pub fn attach(&mut self, analyser: Analyser, title: String) {
        self.bytes = vec![0; analyser.frequency_bin_count()];
        self.analyser = Some(analyser);
        self.title = title;
    }

    pub fn detach(&mut self) {
        self.analyser = None;
        self.bytes.clear();
        self.title.clear();
    }
}

/// Bar `i` reads the single bin at `floor((bins / bars) * i)` - a
/// deterministic downsample, not an average, so jitter in the high bars is
/// expected. Heights scale linearly over the byte range.
fn bar_heights(bytes: &[u8], num_bars: usize, max_height: f64) -> Vec<f64> {
    if bytes.is_empty() {
        return vec![0.0; num_bars];
    }
    let stride = bytes.len() as f64 / num_bars as f64;
    (0..num_bars)
        .map(|i| {
            let bin = (stride * i as f64) as usize;
            max_height / 255.0 * f64::from(bytes[bin])
        })
        .collect()
}

impl Visualizer for SpectrumVisualizer {
    fn name(&self) -> &str {
        "Spectrum"
    }

    fn draw(&mut self, f: &mut Frame, area: Rect) {
        let heights = match self.analyser.as_mut() {
            Some(analyser) => {
                let mut bytes = std::mem::take(&mut self.bytes);
                analyser.byte_frequency_data(&mut bytes);
                self.bytes = bytes;
                bar_heights(&self.bytes, NUM_BARS, MAX_BAR_HEIGHT)
            }
            None => vec![0.0; NUM_BARS],
        };

        let (title, border) = if self.analyser.is_some() {
            (format!(" {} ", self.title), Color::Cyan)
        } else {
            (" no bead playing ".to_string(), Color::DarkGray)
        };

        let canvas = Canvas::default()
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(border)),
            )
            .x_bounds([0.0, NUM_BARS as f64])
            .y_bounds([-(MAX_BAR_HEIGHT + 2.0), MAX_BAR_HEIGHT + 2.0])
            .paint(|ctx| {
                for (i, &height) in heights.iter().enumerate() {
                    let x = i as f64 + 0.5;
                    ctx.draw(&Line {
                        x1: x,
                        y1: -height,
                        x2: x,
                        y2: height,
                        color: BAR_FILL,
                    });
                }
            });

        f.render_widget(canvas, area);
    }
}
