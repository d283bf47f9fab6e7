//! Lightweight daily cron trigger.
//! Supports: "MIN HOUR * * *" (5-field, no seconds), always evaluated in UTC.
//! MIN/HOUR accept: *, */N, N, A-B, A-B/N, and comma lists of those.
//! Example: "0 18 * * *" = every day at 18:00 UTC

use chrono::{DateTime, Duration, Utc};
use enrollbot_core::error::{EnrollBotError, Result};

/// A parsed daily trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronTrigger {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronTrigger {
    /// Parse a cron expression. Day, month and weekday fields must be `*`.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(
                expression,
                "need 5 fields: MIN HOUR DOM MON DOW",
            ));
        }
        if parts[2..].iter().any(|p| *p != "*") {
            return Err(invalid(expression, "only daily schedules are supported"));
        }

        let minutes = parse_field(parts[0], 0, 59)
            .ok_or_else(|| invalid(expression, "bad minute field"))?;
        let hours =
            parse_field(parts[1], 0, 23).ok_or_else(|| invalid(expression, "bad hour field"))?;

        Ok(Self {
            expression: parts.join(" "),
            minutes,
            hours,
        })
    }

    /// Daily at a fixed wall-clock time.
    pub fn daily_at(hour: u32, minute: u32) -> Result<Self> {
        Self::parse(&format!("{minute} {hour} * * *"))
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = after.date_naive();
        for offset in 0..=1 {
            let day = today + Duration::days(offset);
            for &hour in &self.hours {
                for &minute in &self.minutes {
                    let candidate = day.and_hms_opt(hour, minute, 0)?.and_utc();
                    if candidate > after {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

impl std::fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (UTC)", self.expression)
    }
}

fn invalid(expression: &str, reason: &str) -> EnrollBotError {
    EnrollBotError::Scheduler(format!("Invalid cron expression '{expression}': {reason}"))
}

/// Parse a cron field into a sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N: every N
    if let Some(step) = field.strip_prefix("*/") {
        let n = parse_step(step)?;
        return Some((min..=max).step_by(n).collect());
    }

    // "0,15,30,45", "8-18", "0-30/10"
    let mut values = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.trim().split_once('/') {
            Some((range, step)) => (range, parse_step(step)?),
            None => (part.trim(), 1),
        };
        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (a.parse::<u32>().ok()?, b.parse::<u32>().ok()?),
            None => {
                let n = range.parse::<u32>().ok()?;
                (n, n)
            }
        };
        if start < min || end > max || start > end {
            return None;
        }
        values.extend((start..=end).step_by(step));
    }
    values.sort_unstable();
    values.dedup();
    Some(values)
}

fn parse_step(step: &str) -> Option<usize> {
    match step.parse::<usize>().ok()? {
        0 => None,
        n => Some(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_later_same_day() {
        let trigger = CronTrigger::parse("0 18 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 0).unwrap();
        let next = trigger.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_rolls_to_next_day() {
        let trigger = CronTrigger::parse("0 18 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 28, 18, 0, 0).unwrap();
        let next = trigger.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_every_15_minutes() {
        let trigger = CronTrigger::parse("*/15 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = trigger.next_after(after).unwrap();
        assert_eq!(next.hour(), 10);
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_comma_list_unsorted() {
        let trigger = CronTrigger::parse("0 20,8 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 9, 0, 0).unwrap();
        assert_eq!(trigger.next_after(after).unwrap().hour(), 20);
    }

    #[test]
    fn test_ranges() {
        let trigger = CronTrigger::parse("30 8-10 * * *").unwrap();
        assert_eq!(trigger.hours, vec![8, 9, 10]);
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 9, 45, 0).unwrap();
        assert_eq!(
            trigger.next_after(after).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap()
        );

        let stepped = CronTrigger::parse("0-30/10 18 * * *").unwrap();
        assert_eq!(stepped.minutes, vec![0, 10, 20, 30]);
        let mixed = CronTrigger::parse("0 6,20-21 * * *").unwrap();
        assert_eq!(mixed.hours, vec![6, 20, 21]);
    }

    #[test]
    fn test_daily_at() {
        let trigger = CronTrigger::daily_at(18, 0).unwrap();
        assert_eq!(trigger.expression(), "0 18 * * *");
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(CronTrigger::parse("bad").is_err());
        assert!(CronTrigger::parse("61 18 * * *").is_err());
        assert!(CronTrigger::parse("0 18 1 * *").is_err());
        assert!(CronTrigger::parse("*/0 18 * * *").is_err());
        assert!(CronTrigger::parse("0 20-8 * * *").is_err());
        assert!(CronTrigger::parse("0 20-24 * * *").is_err());
        assert!(CronTrigger::parse("0-30/0 18 * * *").is_err());
    }
}
