/// Percentage of a transfer done, given its total size and the bytes still missing.
pub fn percent_complete(total: u64, remaining: u64) -> Option<f32> {
    if total == 0 {
        return None;
    }
    let done = total.saturating_sub(remaining);
    Some((done as f64 / total as f64 * 100.0) as f32)
}

/// Turns raw chunk callbacks of one transfer into a non-decreasing 0-100 figure.
#[derive(Debug, Default)]
pub struct ProgressMeter {
    last: Option<f32>,
}

impl ProgressMeter {
    /// Returns the value to display, or `None` when nothing changed.
    pub fn observe(&mut self, total: u64, remaining: u64) -> Option<f32> {
        let pct = percent_complete(total, remaining)?.clamp(0.0, 100.0);
        match self.last {
            Some(last) if pct <= last => None,
            _ => {
                self.last = Some(pct);
                Some(pct)
            }
        }
    }
}
