use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use mmr_core::models::BackgroundTask;
use mmr_tasks::TaskListView;

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a purge cutoff: epoch milliseconds, an RFC 3339 timestamp, or an age such as
/// `30d` / `12h` counted back from `now`.
pub fn parse_cutoff(input: &str, now: DateTime<Utc>) -> anyhow::Result<i64> {
    let input = input.trim();
    if let Ok(ms) = input.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.timestamp_millis());
    }

    let Some(unit) = input.chars().last() else {
        bail!("Empty cutoff");
    };
    let amount: i64 = input[..input.len() - unit.len_utf8()]
        .parse()
        .with_context(|| format!("Invalid cutoff {:?}", input))?;
    let age = match unit {
        'd' => Duration::try_days(amount),
        'h' => Duration::try_hours(amount),
        'm' => Duration::try_minutes(amount),
        _ => bail!("Invalid cutoff {:?}: expected millis, RFC 3339 or <n>d/<n>h/<n>m", input),
    };
    let cutoff = age
        .and_then(|age| now.checked_sub_signed(age))
        .with_context(|| format!("Cutoff {:?} is out of range", input))?;
    Ok(cutoff.timestamp_millis())
}

/// One line of the task table printed by `tasks watch`.
pub fn format_task_row(task: &BackgroundTask, now: DateTime<Utc>) -> String {
    let params = serde_json::Value::Object(task.params.clone()).to_string();
    let mut row = format!(
        "{:>6}  {:<18} {:<10} {:>16}  {}",
        task.task_id,
        truncate_string(&task.task_name.to_string(), 18),
        task.status().to_string(),
        task.format_duration(now),
        truncate_string(&params, 60)
    );
    if task.has_error() {
        row.push_str(&format!("  error: {}", truncate_string(&task.error_message, 80)));
    }
    row
}

pub fn format_task_list(title: &str, view: &TaskListView, now: DateTime<Utc>) -> String {
    let mut out = format!("{} ({} tasks)", title, view.tasks.len());
    if let Some(at) = view.last_refreshed {
        out.push_str(&format!(", refreshed {}", at.format("%H:%M:%S")));
    }
    if let Some(error) = &view.error {
        out.push_str(&format!("\n  ! {}", error));
    }
    for task in &view.tasks {
        out.push('\n');
        out.push_str(&format_task_row(task, now));
    }
    out
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("", 5), "");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("abc", 2), "...");
        assert_eq!(truncate_string("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn cutoff_accepts_millis_and_rfc3339() {
        assert_eq!(parse_cutoff("1561514528225", now()).unwrap(), 1561514528225);
        assert_eq!(
            parse_cutoff("2023-11-14T22:13:20Z", now()).unwrap(),
            1_700_000_000_000
        );
    }

    #[test]
    fn cutoff_accepts_relative_age() {
        assert_eq!(
            parse_cutoff("30d", now()).unwrap(),
            1_700_000_000_000 - 30 * 86_400_000
        );
        assert_eq!(parse_cutoff("2h", now()).unwrap(), 1_700_000_000_000 - 7_200_000);
        assert!(parse_cutoff("yesterday", now()).is_err());
        assert!(parse_cutoff("5w", now()).is_err());
    }

    #[test]
    fn cutoff_out_of_range_is_an_error() {
        let err = parse_cutoff("99999999999999d", now()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(parse_cutoff("-99999999999999h", now()).is_err());
        assert!(parse_cutoff("9223372036854775807m", now()).is_err());
    }

    #[test]
    fn task_row_shows_running_duration_and_error() {
        let task: BackgroundTask = serde_json::from_value(serde_json::json!({
            "task_id": 12,
            "task_name": "storage_migration",
            "params": { "source_datastore_id": "a" },
            "start_ts": 1_700_000_000_000_i64 - 65_000,
            "end_ts": 0,
            "is_finished": false,
            "error_message": "disk full"
        }))
        .unwrap();

        let row = format_task_row(&task, now());
        assert!(row.contains("storage_migration"));
        assert!(row.contains("running"));
        assert!(row.contains("65s (running)"));
        assert!(row.contains("error: disk full"));
    }

    #[test]
    fn task_list_shows_view_error() {
        let view = TaskListView {
            error: Some("HTTP 502: Bad Gateway".to_string()),
            ..Default::default()
        };
        let out = format_task_list("Unfinished", &view, now());
        assert!(out.starts_with("Unfinished (0 tasks)"));
        assert!(out.contains("! HTTP 502: Bad Gateway"));
    }
}
