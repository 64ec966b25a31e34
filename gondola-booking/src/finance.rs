use std::collections::BTreeMap;

use gondola_core::settings::MAX_FEE_BPS;
use gondola_core::{Booking, BookingStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::lifecycle::BookingError;

/// Split of a flight price between the platform and the pilot.
///
/// `platform_fee = floor(price * bps / 10000)`, the pilot receives the rest,
/// so `platform_fee + pilot_payout == price` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub price_cents: i64,
    pub fee_bps: u32,
    pub platform_fee_cents: i64,
    pub pilot_payout_cents: i64,
}

impl FeeSplit {
    pub fn compute(price_cents: i64, fee_bps: u32) -> Result<Self, BookingError> {
        if price_cents < 0 {
            return Err(BookingError::InvalidAmount(format!(
                "price must not be negative, got {}",
                price_cents
            )));
        }
        if fee_bps > MAX_FEE_BPS {
            return Err(BookingError::InvalidAmount(format!(
                "fee must be at most {} bps, got {}",
                MAX_FEE_BPS, fee_bps
            )));
        }

        // i128 keeps price * bps exact for any i64 price
        let fee = (i128::from(price_cents) * i128::from(fee_bps)) / i128::from(MAX_FEE_BPS);
        let platform_fee_cents = fee as i64;

        Ok(Self {
            price_cents,
            fee_bps,
            platform_fee_cents,
            pilot_payout_cents: price_cents - platform_fee_cents,
        })
    }
}

/// Money owed to one pilot for confirmed bookings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PayoutSummary {
    pub pilot_id: Uuid,
    pub currency: String,
    pub confirmed_bookings: u32,
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub pilot_payout_cents: i64,
}

/// Aggregate confirmed bookings per pilot and currency.
/// Input pairs each booking with the pilot of its flight.
pub fn summarize_payouts<'a, I>(bookings: I) -> Vec<PayoutSummary>
where
    I: IntoIterator<Item = (Uuid, &'a Booking)>,
{
    let mut totals: BTreeMap<(Uuid, String), PayoutSummary> = BTreeMap::new();

    for (pilot_id, booking) in bookings {
        if booking.status != BookingStatus::Confirmed {
            continue;
        }
        let entry = totals
            .entry((pilot_id, booking.currency.clone()))
            .or_insert_with(|| PayoutSummary {
                pilot_id,
                currency: booking.currency.clone(),
                ..Default::default()
            });
        entry.confirmed_bookings += 1;
        entry.gross_cents += booking.amount_cents;
        entry.platform_fee_cents += booking.platform_fee_cents;
        entry.pilot_payout_cents += booking.pilot_payout_cents;
    }

    totals.into_values().collect()
}
