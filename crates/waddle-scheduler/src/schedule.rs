use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tracing::warn;

use crate::types::Schedule;

/// Compute the next UTC execution time for `schedule` starting *after* `from`.
///
/// Returns `None` when the schedule is exhausted (e.g. a `Once` job whose
/// time has already passed) or when the schedule type is not yet supported
/// (e.g. `Cron`).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => {
            // Fire only if the instant is still in the future.
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }

        Schedule::Interval { every_secs } => Some(from + Duration::seconds(*every_secs as i64)),

        Schedule::Daily { hour, minute } => {
            // Build today's candidate at HH:MM:00 UTC.
            let candidate = Utc
                .with_ymd_and_hms(
                    from.year(),
                    from.month(),
                    from.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;
            if candidate > from {
                Some(candidate)
            } else {
                // Today's window has passed — advance to tomorrow.
                Some(candidate + Duration::days(1))
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            // `day` follows ISO weekday numbering: 0=Monday … 6=Sunday,
            // which matches chrono's `num_days_from_monday`.
            let today_dow = from.weekday().num_days_from_monday() as i64;
            let target_dow = (*day as i64).clamp(0, 6);
            let mut days_ahead = target_dow - today_dow;

            // Normalise: negative means the target day already passed this week.
            let candidate_day = if days_ahead < 0 {
                from + Duration::days(7 + days_ahead)
            } else {
                from + Duration::days(days_ahead)
            };

            let candidate = Utc
                .with_ymd_and_hms(
                    candidate_day.year(),
                    candidate_day.month(),
                    candidate_day.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;

            if candidate > from {
                Some(candidate)
            } else {
                // The time on the target weekday has already passed — push 7 days.
                days_ahead = if days_ahead <= 0 { 7 } else { 7 - days_ahead };
                Some(candidate + Duration::days(days_ahead))
            }
        }

        Schedule::Cron { expression } => match cron::Schedule::from_str(expression) {
            Ok(parsed) => parsed.after(&from).next(),
            Err(e) => {
                warn!(expression, "failed to parse cron expression: {e}");
                None
            }
        },
    }
}

/// Validate a cron expression without computing a next run. Used by the
/// workflow validator to reject a `TriggerScheduleConfig` at save time
/// rather than letting it silently never fire.
pub fn validate_cron(expression: &str) -> std::result::Result<(), String> {
    cron::Schedule::from_str(expression)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn once_fires_only_in_the_future() {
        let from = at(2026, 1, 1, 12, 0);
        let future = Schedule::Once { at: at(2026, 1, 1, 13, 0) };
        assert_eq!(compute_next_run(&future, from), Some(at(2026, 1, 1, 13, 0)));

        let past = Schedule::Once { at: at(2026, 1, 1, 11, 0) };
        assert_eq!(compute_next_run(&past, from), None);
    }

    #[test]
    fn interval_advances_from_last_fire() {
        let from = at(2026, 1, 1, 12, 0);
        let sched = Schedule::Interval { every_secs: 90 };
        assert_eq!(compute_next_run(&sched, from), Some(from + Duration::seconds(90)));
    }

    #[test]
    fn daily_rolls_to_tomorrow_once_today_has_passed() {
        let sched = Schedule::Daily { hour: 9, minute: 0 };

        let before_window = at(2026, 1, 1, 8, 0);
        assert_eq!(compute_next_run(&sched, before_window), Some(at(2026, 1, 1, 9, 0)));

        let after_window = at(2026, 1, 1, 9, 30);
        assert_eq!(compute_next_run(&sched, after_window), Some(at(2026, 1, 2, 9, 0)));
    }

    #[test]
    fn weekly_targets_the_requested_weekday() {
        // 2026-01-05 is a Monday.
        let sched = Schedule::Weekly { day: 2, hour: 10, minute: 0 }; // Wednesday
        let from = at(2026, 1, 5, 0, 0);
        let next = compute_next_run(&sched, from).unwrap();
        assert_eq!(next, at(2026, 1, 7, 10, 0));
    }

    #[test]
    fn weekly_wraps_to_next_week_once_passed() {
        // 2026-01-07 is a Wednesday; asking after its 10:00 window should wrap to next Wednesday.
        let sched = Schedule::Weekly { day: 2, hour: 10, minute: 0 };
        let from = at(2026, 1, 7, 11, 0);
        let next = compute_next_run(&sched, from).unwrap();
        assert_eq!(next, at(2026, 1, 14, 10, 0));
    }

    #[test]
    fn cron_uses_the_parsed_schedule() {
        // Every minute at second 0.
        let sched = Schedule::Cron { expression: "0 * * * * *".to_string() };
        let from = at(2026, 1, 1, 12, 0);
        let next = compute_next_run(&sched, from).unwrap();
        assert!(next > from);
    }

    #[test]
    fn cron_invalid_expression_yields_none() {
        let sched = Schedule::Cron { expression: "not a cron expr".to_string() };
        assert_eq!(compute_next_run(&sched, at(2026, 1, 1, 12, 0)), None);
    }

    #[test]
    fn validate_cron_rejects_garbage() {
        assert!(validate_cron("0 * * * * *").is_ok());
        assert!(validate_cron("garbage").is_err());
    }
}
