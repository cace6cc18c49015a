use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Duration Formatting
// ============================================================================

/// Format an elapsed wall-clock time for summaries
pub fn format_elapsed(elapsed: chrono::TimeDelta) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else {
        let secs = millis / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_format_elapsed_millis() {
        assert_eq!(format_elapsed(TimeDelta::milliseconds(0)), "0ms");
        assert_eq!(format_elapsed(TimeDelta::milliseconds(999)), "999ms");
    }

    #[test]
    fn test_format_elapsed_seconds() {
        assert_eq!(format_elapsed(TimeDelta::milliseconds(1500)), "1.5s");
        assert_eq!(format_elapsed(TimeDelta::seconds(59)), "59.0s");
    }

    #[test]
    fn test_format_elapsed_minutes() {
        assert_eq!(format_elapsed(TimeDelta::seconds(125)), "2m 5s");
        assert_eq!(format_elapsed(TimeDelta::minutes(30)), "30m 0s");
    }

    #[test]
    fn test_format_elapsed_negative_clamps() {
        assert_eq!(format_elapsed(TimeDelta::seconds(-3)), "0ms");
    }
}
