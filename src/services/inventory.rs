//! Seat accounting for block-seat flight legs.
//!
//! The ledger knows nothing about bookings. It moves the `available_seats`
//! counter of a leg inside the caller's transaction and refuses any move that
//! would take it below zero or above `total_seats`.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{StoreError, StoreTx};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("flight leg {0} not found")]
    LegNotFound(Uuid),

    #[error("insufficient seats on leg {leg_id}: requested {requested}, available {available}")]
    Insufficient {
        leg_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("seat quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the ledger did to a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The counter moved; `available` is the value after the move.
    Applied { available: i32 },
    /// Template leg. Routing metadata only, nothing to count.
    Untracked,
}

impl LedgerOutcome {
    pub fn is_tracked(self) -> bool {
        matches!(self, LedgerOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Takes `seats` from the leg or fails without touching it.
    pub async fn reserve(
        &self,
        tx: &mut dyn StoreTx,
        leg_id: Uuid,
        seats: i32,
    ) -> Result<LedgerOutcome, InventoryError> {
        if seats <= 0 {
            return Err(InventoryError::InvalidQuantity(seats));
        }

        let leg = tx.lock_leg(leg_id).await?.ok_or(InventoryError::LegNotFound(leg_id))?;
        if !leg.tracks_inventory() {
            debug!("Leg {} ({}) is a template leg, not reserving", leg.id, leg.flight_number);
            return Ok(LedgerOutcome::Untracked);
        }

        match tx.take_seats(leg_id, seats).await? {
            Some(available) => {
                debug!("Reserved {} seats on {} ({} left)", seats, leg.flight_number, available);
                Ok(LedgerOutcome::Applied { available })
            }
            None => Err(InventoryError::Insufficient {
                leg_id,
                requested: seats,
                available: leg.available_seats,
            }),
        }
    }

    /// Reserves the same seat count on several legs. Legs are locked in
    /// ascending id order so concurrent bookings sharing legs cannot deadlock.
    /// The first failure aborts; the caller drops the transaction to undo
    /// whatever was already taken.
    pub async fn reserve_legs(
        &self,
        tx: &mut dyn StoreTx,
        leg_ids: &[Uuid],
        seats: i32,
    ) -> Result<Vec<(Uuid, LedgerOutcome)>, InventoryError> {
        let mut ordered = leg_ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut outcomes = Vec::with_capacity(ordered.len());
        for leg_id in ordered {
            let outcome = self.reserve(tx, leg_id, seats).await?;
            outcomes.push((leg_id, outcome));
        }
        Ok(outcomes)
    }

    /// Gives `seats` back to the leg, clamped to its capacity.
    pub async fn release(
        &self,
        tx: &mut dyn StoreTx,
        leg_id: Uuid,
        seats: i32,
    ) -> Result<LedgerOutcome, InventoryError> {
        if seats <= 0 {
            return Err(InventoryError::InvalidQuantity(seats));
        }

        let leg = tx.lock_leg(leg_id).await?.ok_or(InventoryError::LegNotFound(leg_id))?;
        if !leg.tracks_inventory() {
            return Ok(LedgerOutcome::Untracked);
        }

        if leg.available_seats + seats > leg.total_seats {
            warn!(
                "Release of {} seats on leg {} exceeds capacity ({}/{}), clamping",
                seats, leg_id, leg.available_seats, leg.total_seats
            );
        }

        match tx.return_seats(leg_id, seats).await? {
            Some(available) => Ok(LedgerOutcome::Applied { available }),
            None => Ok(LedgerOutcome::Untracked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlightLeg;
    use crate::store::{BookingStore, MemoryStore, ReferenceData};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn leg(total: i32, block: bool) -> FlightLeg {
        FlightLeg {
            id: Uuid::new_v4(),
            flight_number: "XQ710".into(),
            origin: "FRA".into(),
            destination: "HER".into(),
            departure_date: NaiveDate::from_ymd_opt(2026, 8, 14).unwrap(),
            price_per_seat: 12_000,
            total_seats: total,
            available_seats: total,
            is_block_seat: block,
            block_group_id: None,
        }
    }

    async fn available(store: &MemoryStore, leg_id: Uuid) -> i32 {
        store.flight_leg(leg_id).await.unwrap().unwrap().available_seats
    }

    #[tokio::test]
    async fn reserve_fails_without_partial_mutation() {
        let store = MemoryStore::new();
        let leg = leg(5, true);
        store.insert_leg(leg.clone()).await;
        let ledger = InventoryLedger::new();

        let mut tx = store.begin().await.unwrap();
        let err = ledger.reserve(tx.as_mut(), leg.id, 6).await.unwrap_err();
        assert!(matches!(err, InventoryError::Insufficient { requested: 6, available: 5, .. }));
        tx.commit().await.unwrap();

        assert_eq!(available(&store, leg.id).await, 5);
    }

    #[tokio::test]
    async fn template_legs_are_never_counted() {
        let store = MemoryStore::new();
        let template = leg(0, false);
        store.insert_leg(template.clone()).await;
        let ledger = InventoryLedger::new();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(ledger.reserve(tx.as_mut(), template.id, 3).await.unwrap(), LedgerOutcome::Untracked);
        assert_eq!(ledger.release(tx.as_mut(), template.id, 3).await.unwrap(), LedgerOutcome::Untracked);
        tx.commit().await.unwrap();

        assert_eq!(available(&store, template.id).await, 0);
    }

    #[tokio::test]
    async fn release_is_clamped_to_capacity() {
        let store = MemoryStore::new();
        let leg = leg(4, true);
        store.insert_leg(leg.clone()).await;
        let ledger = InventoryLedger::new();

        let mut tx = store.begin().await.unwrap();
        ledger.reserve(tx.as_mut(), leg.id, 2).await.unwrap();
        ledger.release(tx.as_mut(), leg.id, 2).await.unwrap();
        let second = ledger.release(tx.as_mut(), leg.id, 2).await.unwrap();
        assert_eq!(second, LedgerOutcome::Applied { available: 4 });
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_leg_and_bad_quantity_are_rejected() {
        let store = MemoryStore::new();
        let ledger = InventoryLedger::new();
        let mut tx = store.begin().await.unwrap();

        assert!(matches!(
            ledger.reserve(tx.as_mut(), Uuid::new_v4(), 1).await,
            Err(InventoryError::LegNotFound(_))
        ));
        assert!(matches!(
            ledger.reserve(tx.as_mut(), Uuid::new_v4(), 0).await,
            Err(InventoryError::InvalidQuantity(0))
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i32),
        Release(i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(1..8i32).prop_map(Op::Reserve), (1..8i32).prop_map(Op::Release)]
    }

    proptest! {
        #[test]
        fn counter_stays_within_capacity(total in 0..20i32, ops in proptest::collection::vec(op(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let leg = leg(total, true);
                store.insert_leg(leg.clone()).await;
                let ledger = InventoryLedger::new();

                for op in ops {
                    let mut tx = store.begin().await.unwrap();
                    let _ = match op {
                        Op::Reserve(n) => ledger.reserve(tx.as_mut(), leg.id, n).await,
                        Op::Release(n) => ledger.release(tx.as_mut(), leg.id, n).await,
                    };
                    tx.commit().await.unwrap();

                    let now = available(&store, leg.id).await;
                    assert!(now >= 0 && now <= total, "available {} outside 0..={}", now, total);
                }
            });
        }
    }
}
