use crate::models::{Record, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Receipts exceed the threshold; submitting them pays off.
    Worthwhile,
    /// Nothing is left to collect, but no threshold is configured.
    ThresholdReached,
    NotYetWorthwhile,
}

impl SubmissionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Worthwhile => "Submitting pays off",
            SubmissionStatus::ThresholdReached => "Minimum reached",
            SubmissionStatus::NotYetWorthwhile => "Not worthwhile yet",
        }
    }
}

/// Totals for one calendar year against the configured thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct YearOverview {
    pub year: i32,
    pub record_count: usize,
    pub total: f64,
    /// The larger of the two thresholds.
    pub minimum: f64,
    pub remaining: f64,
    pub status: SubmissionStatus,
}

impl YearOverview {
    pub fn compute(records: &[Record], settings: &Settings, year: i32) -> Self {
        let in_year: Vec<&Record> = records.iter().filter(|r| r.year() == year).collect();
        let total: f64 = in_year.iter().map(|r| r.fields.amount).sum();
        let minimum = settings.deductible().max(settings.reimbursement());
        let remaining = (minimum - total).max(0.0);

        let status = if total >= minimum && minimum > 0.0 {
            SubmissionStatus::Worthwhile
        } else if remaining > 0.0 {
            SubmissionStatus::NotYetWorthwhile
        } else {
            SubmissionStatus::ThresholdReached
        };

        Self {
            year,
            record_count: in_year.len(),
            total,
            minimum,
            remaining,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{RecordFields, RecordId};

    fn record(id: i64, y: i32, amount: f64) -> Record {
        let date = NaiveDate::from_ymd_opt(y, 5, 1).unwrap();
        Record::new(RecordId::from(id), RecordFields::new(date, "Beleg", amount))
    }

    #[test]
    fn test_not_yet_worthwhile() {
        let records = vec![record(1, 2024, 150.0), record(2, 2023, 900.0)];
        let overview = YearOverview::compute(&records, &Settings::new(300.0, 120.0), 2024);
        assert_eq!(overview.record_count, 1);
        assert_eq!(overview.total, 150.0);
        assert_eq!(overview.minimum, 300.0);
        assert_eq!(overview.remaining, 150.0);
        assert_eq!(overview.status, SubmissionStatus::NotYetWorthwhile);
    }

    #[test]
    fn test_worthwhile() {
        let records = vec![record(1, 2024, 150.0), record(2, 2024, 220.0)];
        let overview = YearOverview::compute(&records, &Settings::new(300.0, 0.0), 2024);
        assert_eq!(overview.remaining, 0.0);
        assert_eq!(overview.status, SubmissionStatus::Worthwhile);
    }

    #[test]
    fn test_no_thresholds_configured() {
        let overview = YearOverview::compute(&[], &Settings::default(), 2024);
        assert_eq!(overview.status, SubmissionStatus::ThresholdReached);
    }
}
