/// Format seconds as "MM:SS". Minutes are not rolled into hours.
pub fn format_countdown(total_secs: u32) -> String {
    let m = total_secs / 60;
    let s = total_secs % 60;
    format!("{:02}:{:02}", m, s)
}

/// Fraction of `total_secs` already elapsed, in `[0, 1]`.
pub fn progress(remaining_secs: u32, total_secs: u32) -> f64 {
    if total_secs == 0 {
        return 0.0;
    }
    let elapsed = total_secs.saturating_sub(remaining_secs) as f64;
    (elapsed / total_secs as f64).min(1.0)
}
