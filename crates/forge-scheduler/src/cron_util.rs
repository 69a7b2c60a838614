// forge-scheduler/src/cron_util.rs
// ============================================================================
// Module: Cron Utilities
// Description: Shared 5-field cron parsing for both ScheduledTask (§4.6) and
//              event-bus-adjacent cron triggers.
// Purpose: Give task creation/update one place to reject a malformed
//          expression, and the dispatcher one place to compute the next
//          fire time from an explicit `now` rather than the wall clock.
// Dependencies: cron, chrono
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use cron::Schedule;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A cron expression failed to parse (§4.6: "invalid expressions are
/// detected on save/update and rejected").
#[derive(Debug, Error)]
#[error("invalid cron expression {expression:?}: {reason}")]
pub struct InvalidCronExpression {
    /// The rejected expression.
    pub expression: String,
    /// The parser's reason.
    pub reason: String,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Rejects a malformed cron expression without computing a fire time.
///
/// # Errors
///
/// Returns [`InvalidCronExpression`] when `expression` does not parse.
pub fn validate(expression: &str) -> Result<(), InvalidCronExpression> {
    next_fire_time(expression, Utc::now()).map(|_| ())
}

/// Computes the first fire time strictly after `now`.
///
/// # Errors
///
/// Returns [`InvalidCronExpression`] when `expression` does not parse.
pub fn next_fire_time(expression: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, InvalidCronExpression> {
    let schedule = Schedule::from_str(&to_seconds_form(expression)).map_err(|error| InvalidCronExpression {
        expression: expression.to_string(),
        reason: error.to_string(),
    })?;
    Ok(schedule.after(&now).next())
}

/// §4.6 specifies standard 5-field cron (`min hour day month weekday`), but
/// the `cron` crate parses the Quartz 6/7-field form with a leading
/// seconds field. A bare 5-field expression gets `"0 "` prepended so
/// "every `schedule_expression`-defined minute" still means what the
/// author of a 5-field string expects; anything already 6 or 7 fields
/// (or simply malformed) is passed through untouched and left to fail
/// parsing on its own terms.
fn to_seconds_form(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_expression() {
        assert!(validate("not a cron expression").is_err());
    }

    #[test]
    fn accepts_standard_five_field_expression() {
        assert!(validate("0 2 * * *").is_ok());
    }

    #[test]
    fn next_fire_time_is_strictly_after_now() {
        #[allow(clippy::unwrap_used, reason = "fixed literal timestamp is always valid")]
        let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        #[allow(clippy::unwrap_used, reason = "expression was validated above")]
        let next = next_fire_time("0 2 * * *", now).unwrap();
        assert!(next.is_some_and(|next| next > now));
    }
}
