use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{quote_key, QuoteCache};
use crate::error::BookingError;
use crate::models::{select_rate, FlightLeg, HotelRate, Occupancy, PackageConfig, PackagePriceQuote};
use crate::services::clock::Clock;
use crate::services::pricing::{self, FlightBlockPrice, PriceBreakdown, PriceInput};
use crate::store::ReferenceData;

/// A package priced for one occupancy, with the reference rows the price came from.
#[derive(Debug, Clone)]
pub struct PricedPackage {
    pub package: PackageConfig,
    pub outbound: FlightLeg,
    pub inbound: Option<FlightLeg>,
    pub rate: HotelRate,
    pub travel_date: NaiveDate,
    pub breakdown: PriceBreakdown,
}

impl PricedPackage {
    pub fn leg_ids(&self) -> Vec<Uuid> {
        std::iter::once(self.outbound.id).chain(self.inbound.as_ref().map(|leg| leg.id)).collect()
    }
}

pub struct QuoteService {
    reference: Arc<dyn ReferenceData>,
    cache: Option<QuoteCache>,
    clock: Arc<dyn Clock>,
}

impl QuoteService {
    pub fn new(reference: Arc<dyn ReferenceData>, cache: Option<QuoteCache>, clock: Arc<dyn Clock>) -> Self {
        Self { reference, cache, clock }
    }

    /// Prices a package straight from reference data, bypassing the cache.
    pub async fn price_package(
        &self,
        package_id: Uuid,
        occupancy: &Occupancy,
    ) -> Result<PricedPackage, BookingError> {
        occupancy.check().map_err(BookingError::Validation)?;

        let package = self
            .reference
            .package(package_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("package {}", package_id)))?;

        let outbound = self.leg(package.outbound_leg_id).await?;
        let inbound = match package.return_leg_id {
            Some(leg_id) => Some(self.leg(leg_id).await?),
            None => None,
        };

        let travel_date = outbound.departure_date;
        let rates = self.reference.hotel_rates(package.hotel_id, &package.room_type).await?;
        let rate = select_rate(&rates, travel_date).cloned().ok_or_else(|| {
            BookingError::NotFound(format!(
                "hotel rate for {} ({}) on {}",
                package.hotel_name, package.room_type, travel_date
            ))
        })?;

        let nights = u32::try_from(package.nights).unwrap_or(0);
        let transfer_price = if package.transfer_included { 0 } else { package.transfer_price };
        let flight = FlightBlockPrice {
            outbound_price_per_seat: outbound.price_per_seat,
            return_price_per_seat: inbound.as_ref().map(|leg| leg.price_per_seat),
        };

        let breakdown = pricing::price(&PriceInput {
            occupancy,
            flight,
            rate: &rate,
            nights,
            transfer_price,
            service_charge: package.service_charge,
            profit_margin_percent: package.profit_margin_percent,
        })?;

        Ok(PricedPackage { package, outbound, inbound, rate, travel_date, breakdown })
    }

    /// Cached quote for the customer-facing package page.
    pub async fn quote(&self, package_id: Uuid, occupancy: &Occupancy) -> Result<PackagePriceQuote, BookingError> {
        let revision = match &self.cache {
            Some(_) => self.reference.package(package_id).await?.map(|p| p.revision),
            None => None,
        };

        if let (Some(cache), Some(revision)) = (&self.cache, revision) {
            let key = quote_key(package_id, revision, occupancy);
            if let Some(quote) = cache.get(&key).await {
                debug!("Quote cache hit {}", key);
                return Ok(quote);
            }
        }

        let priced = self.price_package(package_id, occupancy).await?;
        let quote = self.to_quote(&priced, occupancy);

        if let Some(cache) = &self.cache {
            cache.put(&quote_key(package_id, quote.revision, occupancy), &quote).await;
        }
        Ok(quote)
    }

    /// Drops cached quotes after the package's reference data changed.
    pub async fn invalidate(&self, package_id: Uuid) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_package(package_id).await {
                warn!("Failed to invalidate quotes for package {}: {}", package_id, e);
            }
        }
    }

    fn to_quote(&self, priced: &PricedPackage, occupancy: &Occupancy) -> PackagePriceQuote {
        let b = &priced.breakdown;
        PackagePriceQuote {
            package_id: priced.package.id,
            revision: priced.package.revision,
            adults: occupancy.adults,
            children: occupancy.children,
            child_ages: occupancy.child_ages.clone(),
            travel_date: priced.travel_date,
            nights: u32::try_from(priced.package.nights).unwrap_or(0),
            flight_price: b.flight,
            hotel_price: b.hotel,
            transfer_price: b.transfer,
            service_charge: b.service_charge,
            subtotal: b.subtotal,
            total_price: b.total,
            display_price: b.display_price,
            hotel_name: priced.package.hotel_name.clone(),
            board: priced.rate.board.clone(),
            room_type: priced.package.room_type.clone(),
            computed_at: self.clock.now(),
        }
    }

    async fn leg(&self, leg_id: Uuid) -> Result<FlightLeg, BookingError> {
        self.reference
            .flight_leg(leg_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("flight leg {}", leg_id)))
    }
}
