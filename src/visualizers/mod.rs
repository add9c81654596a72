use ratatui::{Frame, layout::Rect};

pub mod pie;
pub mod spectrum;

/// A per-frame renderer for the post screen. Drawing pulls whatever live
/// data the renderer needs; nothing runs between frames, so deactivating a
/// renderer is just not drawing it.
pub trait Visualizer {
    fn name(&self) -> &str;
    fn draw(&mut self, f: &mut Frame, area: Rect);
}
