use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Date-ranged rate row for one hotel room type. Prices are per night, minor units.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct HotelRate {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub room_type: String,
    pub board: String,
    pub from_date: NaiveDate,
    pub till_date: NaiveDate,
    pub single: i64,
    pub double: i64,
    pub extra_bed: i64,
    /// Paying child band as `"min-max"`, e.g. `"7-11"`.
    pub paying_kids_age: String,
    pub payment_kids: i64,
}

impl HotelRate {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.from_date <= date && date <= self.till_date
    }
}

/// First rate whose range contains `date`. Overlaps are not rejected.
pub fn select_rate(rates: &[HotelRate], date: NaiveDate) -> Option<&HotelRate> {
    rates.iter().find(|rate| rate.covers(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(from: (i32, u32, u32), till: (i32, u32, u32), double: i64) -> HotelRate {
        HotelRate {
            id: Uuid::new_v4(),
            hotel_id: Uuid::nil(),
            room_type: "DBL".into(),
            board: "HB".into(),
            from_date: NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            till_date: NaiveDate::from_ymd_opt(till.0, till.1, till.2).unwrap(),
            single: 0,
            double,
            extra_bed: 0,
            paying_kids_age: "2-11".into(),
            payment_kids: 0,
        }
    }

    #[test]
    fn first_matching_range_wins() {
        let rates = vec![
            rate((2026, 6, 1), (2026, 6, 30), 100),
            rate((2026, 6, 15), (2026, 7, 15), 200),
        ];
        let day = |m, d| NaiveDate::from_ymd_opt(2026, m, d).unwrap();

        assert_eq!(select_rate(&rates, day(6, 20)).unwrap().double, 100);
        assert_eq!(select_rate(&rates, day(7, 1)).unwrap().double, 200);
        assert_eq!(select_rate(&rates, day(6, 30)).unwrap().double, 100);
        assert!(select_rate(&rates, day(8, 1)).is_none());
    }
}
