// src/domain/fees.rs
// Transaction charges paid by the company when buying reward shares

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::models::round_inr;

/// Brokerage rate: 0.03% of transaction value.
pub const BROKERAGE_RATE: Decimal = dec!(0.0003);

/// Brokerage is capped at INR 20 per transaction.
pub const BROKERAGE_CAP: Decimal = dec!(20);

/// Securities Transaction Tax: 0.1% on the buy side.
pub const STT_RATE: Decimal = dec!(0.001);

/// GST is charged at 18% on brokerage.
pub const GST_RATE: Decimal = dec!(0.18);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub brokerage: Decimal,
    pub stt: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
}

impl FeeBreakdown {
    /// Fees for buying `quantity` shares at `price_per_share`.
    ///
    /// Each component is rounded to 4 dp for display. The total is the
    /// unrounded components summed, then rounded once.
    pub fn calculate(price_per_share: Decimal, quantity: Decimal) -> Self {
        let total_value = price_per_share * quantity;

        let raw_brokerage = (total_value * BROKERAGE_RATE).min(BROKERAGE_CAP);
        let raw_stt = total_value * STT_RATE;
        let raw_gst = raw_brokerage * GST_RATE;
        let total = round_inr(raw_brokerage + raw_stt + raw_gst);

        let brokerage = round_inr(raw_brokerage);
        let stt = round_inr(raw_stt);
        let gst = round_inr(raw_gst);

        Self {
            brokerage,
            stt,
            gst,
            total,
        }
    }
}
