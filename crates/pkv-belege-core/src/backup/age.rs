use std::fmt;

use chrono::{DateTime, Utc};

/// How long ago the last backup was exported, in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAge {
    Never,
    Today,
    Yesterday,
    DaysAgo(i64),
}

impl BackupAge {
    pub fn from_last_backup(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(last) = last else {
            return BackupAge::Never;
        };
        let days = (now - last).num_days();
        match days {
            // Clock skew counts as today
            d if d <= 0 => BackupAge::Today,
            1 => BackupAge::Yesterday,
            d => BackupAge::DaysAgo(d),
        }
    }
}

impl fmt::Display for BackupAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupAge::Never => f.write_str("no backup yet"),
            BackupAge::Today => f.write_str("today"),
            BackupAge::Yesterday => f.write_str("yesterday"),
            BackupAge::DaysAgo(days) => write!(f, "{} days ago", days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_backup_age_display() {
        let now = Utc::now();
        assert_eq!(BackupAge::from_last_backup(None, now).to_string(), "no backup yet");
        assert_eq!(BackupAge::from_last_backup(Some(now), now), BackupAge::Today);
        assert_eq!(
            BackupAge::from_last_backup(Some(now - Duration::hours(30)), now),
            BackupAge::Yesterday
        );
        assert_eq!(
            BackupAge::from_last_backup(Some(now - Duration::days(12)), now).to_string(),
            "12 days ago"
        );
        assert_eq!(
            BackupAge::from_last_backup(Some(now + Duration::minutes(5)), now),
            BackupAge::Today
        );
    }
}
