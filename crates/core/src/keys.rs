//! Key generation functions.
//!
//! Pure functions for generating partition, sort and index keys following the
//! single-table design. Every entity type owns a distinct PK prefix, so no two
//! logical entities can collide.

use chrono::NaiveDate;

use crate::job::{JobKind, JobStatus};
use crate::storage::{RepositoryError, Result};

// ============================================================================
// Key prefixes
// ============================================================================

pub const PROBLEM_PREFIX: &str = "PROB#";
pub const TESTCASE_PREFIX: &str = "TC#";
pub const USER_PREFIX: &str = "USR#";
pub const EMAIL_PREFIX: &str = "EMAIL#";
pub const OAUTH_PREFIX: &str = "OAUTH#";
pub const PROGRESS_PREFIX: &str = "PROG#";
pub const COUNTER_PREFIX: &str = "COUNTER#";
pub const USAGE_PREFIX: &str = "ULOG#";

/// Sort key of an entity's metadata item.
pub const META_SK: &str = "META";
/// Sort key of a counter item.
pub const COUNTER_SK: &str = "VALUE";

/// Characters that delimit key and blob path segments.
const SEPARATORS: [char; 2] = ['#', '/'];

/// Checks that a caller-supplied value can stand alone as one key segment.
///
/// Segments must be non-empty and free of `#` and `/`, otherwise two
/// different (platform, problem) pairs could map to the same key.
pub fn segment<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value.contains(SEPARATORS) {
        return Err(RepositoryError::invalid_data(format!(
            "Invalid {}: {:?} must be non-empty and contain no '#' or '/'",
            name, value
        )));
    }
    Ok(value)
}

/// Formats a timestamp so that lexicographic order equals numeric order.
pub fn padded_timestamp(ts: i64) -> String {
    format!("{:020}", ts)
}

// ============================================================================
// Problem keys
// ============================================================================

/// Pattern: `PROB#<platform>#<problem_id>`
///
/// Shared by the problem metadata item and all of its test cases.
pub fn problem_pk(platform: &str, problem_id: &str) -> Result<String> {
    Ok(format!(
        "{PROBLEM_PREFIX}{}#{}",
        segment("platform", platform)?,
        segment("problem id", problem_id)?
    ))
}

/// Pattern: `TC#<testcase_id>`
pub fn testcase_sk(testcase_id: &str) -> Result<String> {
    Ok(format!(
        "{TESTCASE_PREFIX}{}",
        segment("test case id", testcase_id)?
    ))
}

/// Pattern: `PROB#STATUS#COMPLETED` or `PROB#STATUS#DRAFT`
pub fn problem_gsi1_pk(completed: bool) -> String {
    let status = if completed { "COMPLETED" } else { "DRAFT" };
    format!("{PROBLEM_PREFIX}STATUS#{status}")
}

/// Pattern: `<created_at:020>#<platform>#<problem_id>`
pub fn problem_gsi1_sk(created_at: i64, platform: &str, problem_id: &str) -> String {
    format!("{}#{platform}#{problem_id}", padded_timestamp(created_at))
}

// ============================================================================
// User keys
// ============================================================================

/// Pattern: `USR#<user_id>`
pub fn user_pk(user_id: u64) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Pattern: `EMAIL#<email>` (GSI1)
pub fn user_email_pk(email: &str) -> String {
    format!("{EMAIL_PREFIX}{}", email.to_lowercase())
}

/// Pattern: `OAUTH#<provider>#<subject>` (GSI2)
pub fn user_oauth_pk(provider: &str, subject: &str) -> String {
    format!("{OAUTH_PREFIX}{provider}#{subject}")
}

/// Index sort key for both user lookups.
///
/// Pattern: `USR#<user_id>`
pub fn user_index_sk(user_id: u64) -> String {
    user_pk(user_id)
}

// ============================================================================
// Job keys
// ============================================================================

/// Pattern: `<KIND>JOB#<job_id>`
pub fn job_pk(kind: JobKind, job_id: &str) -> String {
    format!("{}JOB#{job_id}", kind.key_label())
}

/// Pattern: `<KIND>JOB#STATUS#<STATUS>`
pub fn job_gsi1_pk(kind: JobKind, status: JobStatus) -> String {
    format!("{}JOB#STATUS#{}", kind.key_label(), status.as_str())
}

/// Pattern: `<created_at:020>#<job_id>`
///
/// The id suffix keeps same-second jobs distinct and their order stable.
pub fn job_gsi1_sk(created_at: i64, job_id: &str) -> String {
    format!("{}#{job_id}", padded_timestamp(created_at))
}

/// Pattern: `JOB#<kind>#<job_id>`
pub fn progress_pk(kind: JobKind, job_id: &str) -> String {
    format!("JOB#{}#{job_id}", kind.as_str())
}

/// Pattern: `PROG#<recorded_at_us:020>`
pub fn progress_sk(recorded_at_us: i64) -> String {
    format!("{PROGRESS_PREFIX}{}", padded_timestamp(recorded_at_us))
}

// ============================================================================
// Counter keys
// ============================================================================

/// Pattern: `COUNTER#<name>`
pub fn counter_pk(name: &str) -> String {
    format!("{COUNTER_PREFIX}{name}")
}

// ============================================================================
// Usage log keys
// ============================================================================

/// Pattern: `<subject>#ULOG#<yyyymmdd>`
pub fn usage_pk(subject: &str, day: NaiveDate) -> String {
    format!("{subject}#{USAGE_PREFIX}{}", day.format("%Y%m%d"))
}

/// Pattern: `ULOG#<logged_at_us:020>#<action>`
pub fn usage_sk(logged_at_us: i64, action: &str) -> String {
    format!("{USAGE_PREFIX}{}#{action}", padded_timestamp(logged_at_us))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_keys() {
        assert_eq!(problem_pk("baekjoon", "1000").unwrap(), "PROB#baekjoon#1000");
        assert_eq!(testcase_sk("3").unwrap(), "TC#3");
        assert_eq!(problem_gsi1_pk(true), "PROB#STATUS#COMPLETED");
        assert_eq!(problem_gsi1_pk(false), "PROB#STATUS#DRAFT");
        assert_eq!(
            problem_gsi1_sk(1_700_000_000, "baekjoon", "1000"),
            "00000000001700000000#baekjoon#1000"
        );
    }

    #[test]
    fn test_separators_are_rejected() {
        assert!(problem_pk("a#b", "c").is_err());
        assert!(problem_pk("a", "b#c").is_err());
        assert!(problem_pk("a/b", "c").is_err());
        assert!(problem_pk("", "c").is_err());
        assert!(testcase_sk("1/2").is_err());
        assert!(matches!(
            segment("platform", "a#b"),
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[test]
    fn test_user_keys() {
        assert_eq!(user_pk(42), "USR#42");
        assert_eq!(user_email_pk("Alice@Example.com"), "EMAIL#alice@example.com");
        assert_eq!(user_oauth_pk("google", "1234"), "OAUTH#google#1234");
        assert_eq!(user_index_sk(42), "USR#42");
    }

    #[test]
    fn test_job_keys() {
        assert_eq!(job_pk(JobKind::Extraction, "j1"), "EXTRACTIONJOB#j1");
        assert_eq!(
            job_gsi1_pk(JobKind::Generation, JobStatus::Processing),
            "GENERATIONJOB#STATUS#PROCESSING"
        );
        assert_eq!(job_gsi1_sk(1234, "j1"), "00000000000000001234#j1");
    }

    #[test]
    fn test_progress_keys() {
        assert_eq!(progress_pk(JobKind::Extraction, "j1"), "JOB#extraction#j1");
        assert_eq!(progress_sk(5), "PROG#00000000000000000005");
    }

    #[test]
    fn test_counter_keys() {
        assert_eq!(counter_pk("user"), "COUNTER#user");
        assert_eq!(COUNTER_SK, "VALUE");
    }

    #[test]
    fn test_usage_keys() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(usage_pk("USR#7", day), "USR#7#ULOG#20240309");
        assert_eq!(
            usage_sk(1_710_000_000_000_000, "generate"),
            "ULOG#00001710000000000000#generate"
        );
    }

    #[test]
    fn test_padded_timestamps_sort_numerically() {
        let earlier = job_gsi1_sk(999, "z");
        let later = job_gsi1_sk(1000, "a");
        assert!(earlier < later);
    }
}
