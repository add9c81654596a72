// Exclusive-playback coordination
// At most one bead plays at a time across the whole post

pub mod coordinator;

pub use coordinator::{BeadId, BeadView, Coordinator, Media};

/// Transient playback state of a single bead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeadState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Clock string in the platform's `00m 00s` shape.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let mins = total / 60;
    let secs = total % 60;
    format!("{mins:02}m {secs:02}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_strings() {
        assert_eq!(format_time(0.0), "00m 00s");
        assert_eq!(format_time(7.4), "00m 07s");
        assert_eq!(format_time(61.0), "01m 01s");
        assert_eq!(format_time(600.0), "10m 00s");
        assert_eq!(format_time(-3.0), "00m 00s");
    }
}
