//! Package price engine.
//!
//! Pure functions over already-fetched reference data. All amounts are
//! integer minor units except [`round_to_nearest_nine`], which works on the
//! customer-facing major-unit figure.

use serde::Serialize;

use crate::models::{HotelRate, Occupancy};

/// Infants at or below this age fly free (lap seat).
pub const INFANT_MAX_AGE: u32 = 1;

/// Floor for the customer-facing display price.
pub const MIN_DISPLAY_PRICE: i64 = 99;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("unsupported occupancy: {adults} adults (supported: 1-4)")]
    UnsupportedOccupancy { adults: u32 },

    #[error("invalid occupancy: {0}")]
    InvalidOccupancy(String),

    #[error("invalid paying kids age band '{0}', expected 'min-max'")]
    InvalidAgeBand(String),

    #[error("stay must be at least one night")]
    NoNights,

    #[error("profit margin must be a finite non-negative percentage, got {0}")]
    InvalidMargin(f64),
}

/// Round-trip flight block price. Both legs carry the complete per-person
/// round-trip figure by convention, so it is never doubled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightBlockPrice {
    pub outbound_price_per_seat: i64,
    pub return_price_per_seat: Option<i64>,
}

impl FlightBlockPrice {
    pub fn round_trip_per_person(&self) -> i64 {
        if self.outbound_price_per_seat > 0 {
            self.outbound_price_per_seat
        } else {
            self.return_price_per_seat.unwrap_or(0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceInput<'a> {
    pub occupancy: &'a Occupancy,
    pub flight: FlightBlockPrice,
    pub rate: &'a HotelRate,
    pub nights: u32,
    /// Zero when the transfer is included in the package.
    pub transfer_price: i64,
    pub service_charge: i64,
    pub profit_margin_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub flight: i64,
    pub hotel: i64,
    pub transfer: i64,
    pub service_charge: i64,
    pub subtotal: i64,
    pub total: i64,
    /// Major units, always ending in 9.
    pub display_price: i64,
}

/// Inclusive child age band parsed from a rate row, e.g. `"7-11"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBand {
    pub min: u32,
    pub max: u32,
}

impl AgeBand {
    pub fn parse(raw: &str) -> Result<Self, PricingError> {
        let invalid = || PricingError::InvalidAgeBand(raw.to_string());
        let (min, max) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let min: u32 = min.trim().parse().map_err(|_| invalid())?;
        let max: u32 = max.trim().parse().map_err(|_| invalid())?;
        if min > max {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }
}

pub fn price(input: &PriceInput<'_>) -> Result<PriceBreakdown, PricingError> {
    input.occupancy.check().map_err(PricingError::InvalidOccupancy)?;
    if input.nights == 0 {
        return Err(PricingError::NoNights);
    }
    let margin = input.profit_margin_percent;
    if !margin.is_finite() || margin < 0.0 {
        return Err(PricingError::InvalidMargin(margin));
    }

    let flight = flight_cost(input.occupancy, input.flight.round_trip_per_person());
    let hotel = hotel_cost(input.occupancy, input.rate, input.nights)?;
    let subtotal = flight + hotel + input.transfer_price + input.service_charge;
    let total = apply_margin(subtotal, margin);

    Ok(PriceBreakdown {
        flight,
        hotel,
        transfer: input.transfer_price,
        service_charge: input.service_charge,
        subtotal,
        total,
        display_price: round_to_nearest_nine(total as f64 / 100.0),
    })
}

/// Adults and every child above infant age pay the full round-trip fare.
/// Without ages every child pays.
pub fn flight_cost(occupancy: &Occupancy, per_person: i64) -> i64 {
    let paying_children = if occupancy.has_ages() {
        occupancy.child_ages.iter().filter(|age| **age > INFANT_MAX_AGE).count() as i64
    } else {
        occupancy.children as i64
    };
    (occupancy.adults as i64 + paying_children) * per_person
}

pub fn hotel_cost(occupancy: &Occupancy, rate: &HotelRate, nights: u32) -> Result<i64, PricingError> {
    let nights = nights as i64;
    let room_per_night = match occupancy.adults {
        1 => rate.single,
        2 => rate.double,
        3 => rate.double + rate.extra_bed,
        4 => rate.double * 2,
        adults => return Err(PricingError::UnsupportedOccupancy { adults }),
    };

    let children_per_night = if occupancy.has_ages() {
        let band = AgeBand::parse(&rate.paying_kids_age)?;
        occupancy
            .child_ages
            .iter()
            .map(|&age| {
                if age < band.min {
                    0
                } else if age <= band.max {
                    rate.payment_kids
                } else {
                    rate.extra_bed
                }
            })
            .sum::<i64>()
    } else {
        occupancy.children as i64 * rate.payment_kids
    };

    Ok((room_per_night + children_per_night) * nights)
}

/// Profit margin is applied once, on the whole subtotal.
pub fn apply_margin(subtotal: i64, margin_percent: f64) -> i64 {
    (subtotal as f64 * (1.0 + margin_percent / 100.0)).round() as i64
}

/// Retail rounding: last digit `< 4` goes down to the previous 9, anything
/// else goes up to the next 9. Never below [`MIN_DISPLAY_PRICE`].
pub fn round_to_nearest_nine(value: f64) -> i64 {
    let n = if value.is_finite() { value.round() as i64 } else { 0 };
    let last = n.rem_euclid(10);
    let rounded = if last < 4 { n - last - 1 } else { n - last + 9 };
    rounded.max(MIN_DISPLAY_PRICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn rate(single: i64, double: i64, extra_bed: i64, band: &str, kids: i64) -> HotelRate {
        HotelRate {
            id: Uuid::new_v4(),
            hotel_id: Uuid::new_v4(),
            room_type: "DBL".into(),
            board: "AI".into(),
            from_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            till_date: NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
            single,
            double,
            extra_bed,
            paying_kids_age: band.into(),
            payment_kids: kids,
        }
    }

    fn flight(per_person: i64) -> FlightBlockPrice {
        FlightBlockPrice { outbound_price_per_seat: per_person, return_price_per_seat: Some(per_person) }
    }

    #[test]
    fn family_of_three_matches_worked_example() {
        let occupancy = Occupancy::new(2, 1, vec![8]);
        let rate = rate(6_000, 8_000, 3_000, "7-11", 2_000);
        let input = PriceInput {
            occupancy: &occupancy,
            flight: flight(12_000),
            rate: &rate,
            nights: 3,
            transfer_price: 0,
            service_charge: 0,
            profit_margin_percent: 10.0,
        };

        let breakdown = price(&input).unwrap();
        assert_eq!(breakdown.flight, 36_000);
        assert_eq!(breakdown.hotel, 30_000);
        assert_eq!(breakdown.subtotal, 66_000);
        assert_eq!(breakdown.total, 72_600);
        assert_eq!(breakdown.display_price, 729);
    }

    #[test]
    fn room_cost_follows_adult_count() {
        let rate = rate(5_000, 8_000, 3_000, "2-11", 1_000);
        let cost = |adults| hotel_cost(&Occupancy::adults(adults), &rate, 2);

        assert_eq!(cost(1).unwrap(), 10_000);
        assert_eq!(cost(2).unwrap(), 16_000);
        assert_eq!(cost(3).unwrap(), 22_000);
        assert_eq!(cost(4).unwrap(), 32_000);
        assert_eq!(cost(0), Err(PricingError::UnsupportedOccupancy { adults: 0 }));
        assert_eq!(cost(5), Err(PricingError::UnsupportedOccupancy { adults: 5 }));
    }

    #[test]
    fn child_hotel_cost_uses_age_band() {
        let rate = rate(5_000, 8_000, 3_000, "7-11", 2_000);
        let below = Occupancy::new(2, 1, vec![6]);
        let inside = Occupancy::new(2, 2, vec![7, 11]);
        let above = Occupancy::new(2, 1, vec![12]);

        assert_eq!(hotel_cost(&below, &rate, 1).unwrap(), 8_000);
        assert_eq!(hotel_cost(&inside, &rate, 1).unwrap(), 8_000 + 4_000);
        assert_eq!(hotel_cost(&above, &rate, 1).unwrap(), 8_000 + 3_000);
    }

    #[test]
    fn children_without_ages_use_flat_rate_and_full_fare() {
        let rate = rate(5_000, 8_000, 3_000, "7-11", 2_000);
        let occupancy = Occupancy::new(2, 2, vec![]);

        assert_eq!(hotel_cost(&occupancy, &rate, 3).unwrap(), (8_000 + 4_000) * 3);
        assert_eq!(flight_cost(&occupancy, 10_000), 40_000);
    }

    #[test]
    fn infants_fly_free() {
        let occupancy = Occupancy::new(1, 3, vec![0, 1, 2]);
        assert_eq!(flight_cost(&occupancy, 10_000), 20_000);
    }

    #[test]
    fn return_leg_price_is_the_fallback() {
        let block = FlightBlockPrice { outbound_price_per_seat: 0, return_price_per_seat: Some(9_900) };
        assert_eq!(block.round_trip_per_person(), 9_900);
    }

    #[test]
    fn margin_applies_once_to_whole_subtotal() {
        let occupancy = Occupancy::adults(1);
        let rate = rate(10_000, 0, 0, "2-11", 0);
        let input = PriceInput {
            occupancy: &occupancy,
            flight: flight(20_000),
            rate: &rate,
            nights: 1,
            transfer_price: 5_000,
            service_charge: 5_000,
            profit_margin_percent: 20.0,
        };

        let breakdown = price(&input).unwrap();
        assert_eq!(breakdown.subtotal, 40_000);
        assert_eq!(breakdown.total, 48_000);
    }

    #[test]
    fn malformed_band_is_rejected() {
        assert!(AgeBand::parse("7-11").is_ok());
        assert!(AgeBand::parse(" 2 - 6 ").is_ok());
        assert!(AgeBand::parse("11-7").is_err());
        assert!(AgeBand::parse("seven").is_err());
    }

    #[test]
    fn rounding_examples() {
        assert_eq!(round_to_nearest_nine(726.0), 729);
        assert_eq!(round_to_nearest_nine(723.0), 719);
        assert_eq!(round_to_nearest_nine(724.4), 729);
        assert_eq!(round_to_nearest_nine(1_000.0), 999);
        assert_eq!(round_to_nearest_nine(12.0), 99);
        assert_eq!(round_to_nearest_nine(-40.0), 99);
        assert_eq!(round_to_nearest_nine(f64::NAN), 99);
    }

    proptest! {
        #[test]
        fn rounding_is_idempotent(p in -1_000_000.0f64..10_000_000.0) {
            let once = round_to_nearest_nine(p);
            prop_assert_eq!(round_to_nearest_nine(once as f64), once);
            prop_assert_eq!(once.rem_euclid(10), 9);
            prop_assert!(once >= MIN_DISPLAY_PRICE);
        }
    }
}
