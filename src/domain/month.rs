use crate::domain::models::{Day, MonthSelection};

/// One `Day` per calendar date of `selection`, each seeded with a single empty interval.
pub fn build_month(selection: MonthSelection) -> Vec<Day> {
    let first = selection.first_day();
    first
        .iter_days()
        .take(selection.days_in_month() as usize)
        .map(Day::new)
        .collect()
}
