//! Monthly school fees derived from each student's age.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{clock::Clock, store::StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub preschool_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBand {
    pub min_age: u32,
    pub monthly_fee_cents: i64,
}

/// Age bands, each applying from `min_age` until the next band starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    bands: Vec<FeeBand>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(vec![
            FeeBand {
                min_age: 0,
                monthly_fee_cents: 150_000,
            },
            FeeBand {
                min_age: 2,
                monthly_fee_cents: 130_000,
            },
            FeeBand {
                min_age: 4,
                monthly_fee_cents: 110_000,
            },
        ])
    }
}

impl FeeSchedule {
    pub fn new(mut bands: Vec<FeeBand>) -> Self {
        bands.sort_by_key(|b| b.min_age);
        Self { bands }
    }

    pub fn fee_for_age(&self, age: u32) -> Option<i64> {
        self.bands
            .iter()
            .rev()
            .find(|b| b.min_age <= age)
            .map(|b| b.monthly_fee_cents)
    }
}

/// Whole years completed on `on`. Zero for dates before birth.
pub fn age_in_years(date_of_birth: NaiveDate, on: NaiveDate) -> u32 {
    if on < date_of_birth {
        return 0;
    }
    let mut years = on.year() - date_of_birth.year();
    if (on.month(), on.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BillingMonth {
    first_day: NaiveDate,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first_day: date - Duration::days(i64::from(date.day0())),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// Clamped to 28 so every month has the day.
    pub fn due_date(&self, due_day: u32) -> NaiveDate {
        let day = due_day.clamp(1, 28);
        self.first_day + Duration::days(i64::from(day - 1))
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.first_day.year(), self.first_day.month())
    }
}

impl FromStr for BillingMonth {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FeeError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        BillingMonth::new(year, month).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    Pending,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFee {
    pub id: String,
    pub student_id: String,
    pub preschool_id: String,
    pub billing_month: NaiveDate,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StudentFee {
    pub fn status(&self, today: NaiveDate, grace_days: u32) -> FeeStatus {
        if self.paid_at.is_some() {
            FeeStatus::Paid
        } else if today > self.due_date + Duration::days(i64::from(grace_days)) {
            FeeStatus::Overdue
        } else {
            FeeStatus::Pending
        }
    }

    /// Days past the due date, zero unless overdue.
    pub fn days_overdue(&self, today: NaiveDate, grace_days: u32) -> i64 {
        match self.status(today, grace_days) {
            FeeStatus::Overdue => (today - self.due_date).num_days(),
            FeeStatus::Pending | FeeStatus::Paid => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueFee {
    #[serde(flatten)]
    pub fee: StudentFee,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeeGenerationReport {
    pub billing_month: String,
    pub created: u32,
    pub skipped: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FeeError {
    #[error("Invalid billing month, expected YYYY-MM: {0}")]
    InvalidMonth(String),
    #[error("Fee not found: {0}")]
    NotFound(String),
    #[error("No fee band covers age {0}")]
    NoFeeBand(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait FeeStore: Send + Sync {
    async fn active_students(&self, preschool_id: &str) -> Result<Vec<Student>, StoreError>;

    /// `false` when a fee for the same student and month already exists.
    async fn insert_fee_if_absent(&self, fee: &StudentFee) -> Result<bool, StoreError>;

    async fn unpaid_fees(&self, preschool_id: &str) -> Result<Vec<StudentFee>, StoreError>;

    /// Keeps the original `paid_at` if the fee was already paid.
    async fn mark_fee_paid(
        &self,
        fee_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<StudentFee>, StoreError>;
}

pub struct FeeService {
    store: Arc<dyn FeeStore>,
    clock: Arc<dyn Clock>,
    schedule: FeeSchedule,
    due_day: u32,
    grace_days: u32,
}

impl FeeService {
    pub fn new(
        store: Arc<dyn FeeStore>,
        clock: Arc<dyn Clock>,
        schedule: FeeSchedule,
        due_day: u32,
        grace_days: u32,
    ) -> Self {
        Self {
            store,
            clock,
            schedule,
            due_day,
            grace_days,
        }
    }

    pub fn fee_for(&self, student: &Student, month: BillingMonth) -> Result<i64, FeeError> {
        let age = age_in_years(student.date_of_birth, month.first_day());
        self.schedule.fee_for_age(age).ok_or(FeeError::NoFeeBand(age))
    }

    /// One fee per active student for `month`; safe to run repeatedly.
    pub async fn generate_monthly_fees(
        &self,
        preschool_id: &str,
        month: BillingMonth,
    ) -> Result<FeeGenerationReport, FeeError> {
        let now = self.clock.now();
        let students = self.store.active_students(preschool_id).await?;

        let mut report = FeeGenerationReport {
            billing_month: month.to_string(),
            ..Default::default()
        };

        // price everyone first so a missing band leaves the month untouched
        let priced = students
            .into_iter()
            .map(|student| Ok((self.fee_for(&student, month)?, student)))
            .collect::<Result<Vec<_>, FeeError>>()?;

        for (amount_cents, student) in priced {
            let fee = StudentFee {
                id: uuid::Uuid::new_v4().to_string(),
                student_id: student.id.clone(),
                preschool_id: student.preschool_id.clone(),
                billing_month: month.first_day(),
                amount_cents,
                due_date: month.due_date(self.due_day),
                paid_at: None,
                created_at: now,
            };

            if self.store.insert_fee_if_absent(&fee).await? {
                report.created += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            preschool = %preschool_id,
            month = %report.billing_month,
            created = report.created,
            skipped = report.skipped,
            "Monthly fees generated"
        );

        Ok(report)
    }

    pub async fn overdue_fees(&self, preschool_id: &str) -> Result<Vec<OverdueFee>, FeeError> {
        let today = self.clock.now().date_naive();

        let overdue = self
            .store
            .unpaid_fees(preschool_id)
            .await?
            .into_iter()
            .filter(|fee| fee.status(today, self.grace_days) == FeeStatus::Overdue)
            .map(|fee| OverdueFee {
                days_overdue: fee.days_overdue(today, self.grace_days),
                fee,
            })
            .collect();

        Ok(overdue)
    }

    pub async fn mark_paid(&self, fee_id: &str) -> Result<StudentFee, FeeError> {
        self.store
            .mark_fee_paid(fee_id, self.clock.now())
            .await?
            .ok_or_else(|| FeeError::NotFound(fee_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{clock::FixedClock, store::MemoryStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn student(id: &str, dob: NaiveDate, active: bool) -> Student {
        Student {
            id: id.into(),
            preschool_id: "school-1".into(),
            first_name: id.into(),
            last_name: "Dlamini".into(),
            date_of_birth: dob,
            active,
        }
    }

    async fn setup(today: NaiveDate) -> (Arc<MemoryStore>, Arc<FixedClock>, FeeService) {
        let store = Arc::new(MemoryStore::new());
        store.add_student(student("lerato", date(2025, 6, 1), true)).await;
        store.add_student(student("sipho", date(2023, 11, 15), true)).await;
        store.add_student(student("naledi", date(2021, 2, 1), true)).await;
        store.add_student(student("gone", date(2022, 1, 1), false)).await;

        let clock = Arc::new(FixedClock::new(
            Utc.from_utc_datetime(&today.and_hms_opt(9, 0, 0).unwrap()),
        ));
        let fees = FeeService::new(store.clone(), clock.clone(), FeeSchedule::default(), 7, 0);
        (store, clock, fees)
    }

    #[test]
    fn age_counts_completed_years() {
        assert_eq!(age_in_years(date(2022, 10, 20), date(2026, 10, 19)), 3);
        assert_eq!(age_in_years(date(2022, 10, 19), date(2026, 10, 19)), 4);
        assert_eq!(age_in_years(date(2027, 1, 1), date(2026, 10, 19)), 0);
    }

    #[test]
    fn schedule_picks_the_highest_matching_band() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.fee_for_age(0), Some(150_000));
        assert_eq!(schedule.fee_for_age(1), Some(150_000));
        assert_eq!(schedule.fee_for_age(3), Some(130_000));
        assert_eq!(schedule.fee_for_age(6), Some(110_000));

        let partial = FeeSchedule::new(vec![FeeBand {
            min_age: 3,
            monthly_fee_cents: 1,
        }]);
        assert_eq!(partial.fee_for_age(2), None);
    }

    #[test]
    fn billing_month_parses_and_clamps_due_day() {
        let month: BillingMonth = "2026-02".parse().unwrap();
        assert_eq!(month.first_day(), date(2026, 2, 1));
        assert_eq!(month.due_date(7), date(2026, 2, 7));
        assert_eq!(month.due_date(31), date(2026, 2, 28));
        assert_eq!(month.to_string(), "2026-02");
        assert!("2026-13".parse::<BillingMonth>().is_err());
        assert!("Feb 2026".parse::<BillingMonth>().is_err());
        assert_eq!(BillingMonth::containing(date(2026, 2, 17)), month);
    }

    #[test]
    fn fee_status_respects_grace() {
        let fee = StudentFee {
            id: "f1".into(),
            student_id: "s1".into(),
            preschool_id: "school-1".into(),
            billing_month: date(2026, 10, 1),
            amount_cents: 130_000,
            due_date: date(2026, 10, 7),
            paid_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        };

        assert_eq!(fee.status(date(2026, 10, 7), 0), FeeStatus::Pending);
        assert_eq!(fee.status(date(2026, 10, 8), 0), FeeStatus::Overdue);
        assert_eq!(fee.days_overdue(date(2026, 10, 8), 0), 1);
        assert_eq!(fee.status(date(2026, 10, 8), 3), FeeStatus::Pending);
        assert_eq!(fee.days_overdue(date(2026, 10, 8), 3), 0);

        let paid = StudentFee {
            paid_at: Some(Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap()),
            ..fee
        };
        assert_eq!(paid.status(date(2026, 12, 1), 0), FeeStatus::Paid);
    }

    #[tokio::test]
    async fn generation_is_age_based_and_idempotent() {
        let (store, _clock, fees) = setup(date(2026, 10, 19)).await;
        let month: BillingMonth = "2026-10".parse().unwrap();

        let first = fees.generate_monthly_fees("school-1", month).await.unwrap();
        assert_eq!((first.created, first.skipped), (3, 0));

        let again = fees.generate_monthly_fees("school-1", month).await.unwrap();
        assert_eq!((again.created, again.skipped), (0, 3));

        let mut amounts: Vec<(String, i64)> = store
            .fees()
            .await
            .into_iter()
            .map(|f| (f.student_id, f.amount_cents))
            .collect();
        amounts.sort();
        assert_eq!(
            amounts,
            vec![
                ("lerato".to_string(), 150_000),
                ("naledi".to_string(), 110_000),
                ("sipho".to_string(), 130_000),
            ]
        );
    }

    #[tokio::test]
    async fn missing_band_creates_no_fees() {
        let store = Arc::new(MemoryStore::new());
        store.add_student(student("naledi", date(2021, 2, 1), true)).await;
        store.add_student(student("lerato", date(2025, 6, 1), true)).await;
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()));
        let schedule = FeeSchedule::new(vec![FeeBand {
            min_age: 3,
            monthly_fee_cents: 110_000,
        }]);
        let fees = FeeService::new(store.clone(), clock, schedule, 7, 0);
        let month: BillingMonth = "2026-10".parse().unwrap();

        assert!(matches!(
            fees.generate_monthly_fees("school-1", month).await,
            Err(FeeError::NoFeeBand(1))
        ));
        assert!(store.fees().await.is_empty());
    }

    #[tokio::test]
    async fn overdue_and_payment() {
        let (_store, clock, fees) = setup(date(2026, 10, 3)).await;
        let month: BillingMonth = "2026-10".parse().unwrap();
        fees.generate_monthly_fees("school-1", month).await.unwrap();

        assert!(fees.overdue_fees("school-1").await.unwrap().is_empty());

        clock.set(Utc.with_ymd_and_hms(2026, 10, 10, 9, 0, 0).unwrap());
        let overdue = fees.overdue_fees("school-1").await.unwrap();
        assert_eq!(overdue.len(), 3);
        assert!(overdue.iter().all(|o| o.days_overdue == 3));

        let paid = fees.mark_paid(&overdue[0].fee.id).await.unwrap();
        assert!(paid.paid_at.is_some());
        assert_eq!(fees.overdue_fees("school-1").await.unwrap().len(), 2);

        assert!(matches!(
            fees.mark_paid("missing").await,
            Err(FeeError::NotFound(_))
        ));
    }
}
