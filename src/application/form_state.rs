use crate::domain::models::{Day, DayStatus, Interval, IntervalField, MonthSelection, TimeOfDay};
use crate::domain::month::build_month;
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use std::sync::Arc;

/// In-memory hours form for one month.
///
/// Days are shared behind `Arc`; a mutation clones only the touched day, so
/// a caller holding an earlier `days()` can detect changes with `Arc::ptr_eq`.
#[derive(Debug, Clone)]
pub struct FormState {
    selection: MonthSelection,
    days: Vec<Arc<Day>>,
}

impl FormState {
    pub fn new(selection: MonthSelection) -> Self {
        Self {
            selection,
            days: Self::fresh_days(selection),
        }
    }

    fn fresh_days(selection: MonthSelection) -> Vec<Arc<Day>> {
        build_month(selection).into_iter().map(Arc::new).collect()
    }

    /// Unsaved entries of the previous month are discarded.
    pub fn set_month(&mut self, selection: MonthSelection) {
        self.selection = selection;
        self.days = Self::fresh_days(selection);
    }

    pub fn selection(&self) -> MonthSelection {
        self.selection
    }

    pub fn days(&self) -> Vec<Arc<Day>> {
        self.days.clone()
    }

    pub fn day(&self, day_index: usize) -> Result<&Day, InfraError> {
        self.days
            .get(day_index)
            .map(Arc::as_ref)
            .ok_or_else(|| day_out_of_range(day_index, self.days.len()))
    }

    pub fn snapshot(&self) -> Vec<Day> {
        self.days.iter().map(|day| Day::clone(day)).collect()
    }

    /// An empty or whitespace value clears the field.
    pub fn update_interval(
        &mut self,
        day_index: usize,
        interval_index: usize,
        field: IntervalField,
        value: &str,
    ) -> Result<&Day, InfraError> {
        let trimmed = value.trim();
        let parsed = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.parse::<TimeOfDay>().map_err(InfraError::InvalidInput)?)
        };

        let interval_count = self.day(day_index)?.intervals.len();
        if interval_index >= interval_count {
            return Err(interval_out_of_range(day_index, interval_index, interval_count));
        }

        let day = Arc::make_mut(&mut self.days[day_index]);
        day.intervals[interval_index].set(field, parsed);
        Ok(day)
    }

    pub fn add_interval(&mut self, day_index: usize) -> Result<&Day, InfraError> {
        self.day(day_index)?;
        let day = Arc::make_mut(&mut self.days[day_index]);
        day.intervals.push(Interval::default());
        Ok(day)
    }

    /// A day always keeps at least one interval.
    pub fn remove_interval(&mut self, day_index: usize, interval_index: usize) -> Result<&Day, InfraError> {
        let interval_count = self.day(day_index)?.intervals.len();
        if interval_index >= interval_count {
            return Err(interval_out_of_range(day_index, interval_index, interval_count));
        }
        if interval_count == 1 {
            return Err(InfraError::InvalidInput(format!(
                "day {day_index} must keep at least one interval"
            )));
        }

        let day = Arc::make_mut(&mut self.days[day_index]);
        day.intervals.remove(interval_index);
        Ok(day)
    }

    pub fn day_status(&self, day_index: usize) -> Result<DayStatus, InfraError> {
        Ok(self.day(day_index)?.status())
    }

    pub fn has_errors(&self) -> bool {
        self.days.iter().any(|day| day.status() == DayStatus::Error)
    }

    pub fn error_dates(&self) -> Vec<NaiveDate> {
        self.days
            .iter()
            .filter(|day| day.status() == DayStatus::Error)
            .map(|day| day.date)
            .collect()
    }

    pub fn total_worked_minutes(&self) -> u32 {
        self.days.iter().map(|day| day.worked_minutes()).sum()
    }
}

fn day_out_of_range(day_index: usize, day_count: usize) -> InfraError {
    InfraError::InvalidInput(format!(
        "day index {day_index} is out of range (month has {day_count} days)"
    ))
}

fn interval_out_of_range(day_index: usize, interval_index: usize, interval_count: usize) -> InfraError {
    InfraError::InvalidInput(format!(
        "interval index {interval_index} is out of range for day {day_index} ({interval_count} intervals)"
    ))
}
