//! Input boundary — turns raw broker records into typed positions and operations.
//!
//! This is the only place that looks at broker field shapes. Everything past
//! `classify` works with `Position` / `Operation` and can assume:
//! - quantities and prices are finite and non-negative
//! - currency codes are three uppercase ASCII letters
//! - sector/geography labels are lowercase, with `"unknown"` standing in for
//!   anything the broker left out

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{InstrumentType, Operation, Position, PositionSet, Side, TaxLot, UNKNOWN};
use crate::error::ValidationError;

/// A position as delivered by the brokerage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    #[serde(alias = "instrument_id", alias = "figi", alias = "ticker")]
    pub instrument_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub quantity: f64,
    #[serde(alias = "current_price")]
    pub current_price: f64,
    #[serde(default, alias = "average_price")]
    pub average_price: Option<f64>,
    pub currency: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default, alias = "instrument_type")]
    pub instrument_type: Option<String>,
    #[serde(default, alias = "acquired_on")]
    pub acquired_on: Option<NaiveDate>,
    #[serde(default)]
    pub lots: Vec<RawTaxLot>,
}

/// A tax lot as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTaxLot {
    pub quantity: f64,
    #[serde(alias = "unit_cost")]
    pub unit_cost: f64,
    #[serde(alias = "acquired_on")]
    pub acquired_on: NaiveDate,
}

/// A historical operation as delivered by the broker.
///
/// `date` accepts either a plain `YYYY-MM-DD` date or an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    #[serde(alias = "instrument_id", alias = "figi", alias = "ticker")]
    pub instrument_id: String,
    #[serde(rename = "type", alias = "side")]
    pub side: String,
    pub date: String,
    pub quantity: f64,
    pub price: f64,
}

/// Classify a single raw position.
pub fn classify(raw: &RawPosition) -> Result<Position, ValidationError> {
    let id = raw.instrument_id.trim();
    if id.is_empty() {
        return Err(ValidationError::EmptyInstrumentId);
    }

    let quantity = non_negative(id, "quantity", raw.quantity)?;
    let current_price = non_negative(id, "currentPrice", raw.current_price)?;
    let currency = currency_code(id, &raw.currency)?;

    let lots = raw
        .lots
        .iter()
        .map(|lot| {
            Ok(TaxLot {
                quantity: non_negative(id, "lot.quantity", lot.quantity)?,
                unit_cost: non_negative(id, "lot.unitCost", lot.unit_cost)?,
                acquired_on: lot.acquired_on,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    // Brokers report 0 when they have no cost basis.
    let average_price = match raw.average_price {
        Some(avg) => {
            let avg = non_negative(id, "averagePrice", avg)?;
            (avg > 0.0).then_some(avg)
        }
        None => None,
    }
    .or_else(|| average_from_lots(&lots));

    let geography = match raw.geography.as_deref().and_then(label) {
        Some(g) => g,
        None => geography_for_currency(&currency)
            .unwrap_or(UNKNOWN)
            .to_string(),
    };

    Ok(Position {
        instrument_id: id.to_string(),
        name: raw.name.clone().filter(|n| !n.trim().is_empty()),
        quantity,
        current_price,
        average_price,
        currency,
        sector: raw
            .sector
            .as_deref()
            .and_then(label)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        geography,
        instrument_type: raw
            .instrument_type
            .as_deref()
            .map(InstrumentType::parse)
            .unwrap_or(InstrumentType::Other),
        acquired_on: raw.acquired_on,
        lots,
    })
}

/// Classify a whole broker snapshot. Duplicate instrument ids are rejected.
///
/// Zero-quantity positions are kept; callers decide whether to filter them.
pub fn classify_all(raws: &[RawPosition]) -> Result<PositionSet, ValidationError> {
    let positions = raws.iter().map(classify).collect::<Result<Vec<_>, _>>()?;
    let set = PositionSet::from_positions(positions)?;
    debug!(positions = set.len(), total_value = set.total_value(), "classified positions");
    Ok(set)
}

/// Classify a single raw operation.
pub fn classify_operation(raw: &RawOperation) -> Result<Operation, ValidationError> {
    let id = raw.instrument_id.trim();
    if id.is_empty() {
        return Err(ValidationError::EmptyInstrumentId);
    }
    let side = Side::parse(&raw.side).ok_or_else(|| ValidationError::UnknownSide {
        instrument_id: id.to_string(),
        side: raw.side.clone(),
    })?;
    let date = parse_date(&raw.date).ok_or_else(|| ValidationError::InvalidDate {
        instrument_id: id.to_string(),
        raw: raw.date.clone(),
    })?;

    Ok(Operation {
        instrument_id: id.to_string(),
        side,
        date,
        quantity: non_negative(id, "quantity", raw.quantity)?,
        price: non_negative(id, "price", raw.price)?,
    })
}

pub fn classify_operations(raws: &[RawOperation]) -> Result<Vec<Operation>, ValidationError> {
    raws.iter().map(classify_operation).collect()
}

/// Geography implied by a currency, used when the broker omits it.
pub fn geography_for_currency(code: &str) -> Option<&'static str> {
    match code {
        "USD" | "CAD" => Some("north_america"),
        "EUR" | "GBP" | "CHF" | "SEK" | "NOK" | "DKK" | "PLN" | "CZK" => Some("europe"),
        "RUB" => Some("russia"),
        "CNY" | "HKD" | "JPY" | "KRW" | "SGD" | "INR" | "KZT" => Some("asia"),
        "AUD" | "NZD" => Some("oceania"),
        "BRL" | "MXN" => Some("latin_america"),
        _ => None,
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn non_negative(id: &str, field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            instrument_id: id.to_string(),
            field,
            value,
        });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative {
            instrument_id: id.to_string(),
            field,
            value,
        });
    }
    Ok(value)
}

fn currency_code(id: &str, raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(ValidationError::UnknownCurrency {
            instrument_id: id.to_string(),
            code: raw.to_string(),
        })
    }
}

/// Normalized classification label, or `None` if blank.
fn label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn average_from_lots(lots: &[TaxLot]) -> Option<f64> {
    let quantity: f64 = lots.iter().map(|l| l.quantity).sum();
    if quantity <= 0.0 {
        return None;
    }
    let cost: f64 = lots.iter().map(|l| l.quantity * l.unit_cost).sum();
    Some(cost / quantity)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str) -> RawPosition {
        RawPosition {
            instrument_id: id.into(),
            name: None,
            quantity: 10.0,
            current_price: 100.0,
            average_price: Some(90.0),
            currency: "usd".into(),
            sector: Some(" Technology ".into()),
            geography: None,
            instrument_type: Some("share".into()),
            acquired_on: None,
            lots: vec![],
        }
    }

    #[test]
    fn classify_normalizes_labels() {
        let p = classify(&raw("AAPL")).unwrap();
        assert_eq!(p.currency, "USD");
        assert_eq!(p.sector, "technology");
        assert_eq!(p.geography, "north_america");
        assert_eq!(p.instrument_type, InstrumentType::Stock);
        assert_eq!(p.value(), 1000.0);
    }

    #[test]
    fn missing_optional_fields_become_unknown() {
        let mut r = raw("X");
        r.sector = None;
        r.average_price = None;
        r.currency = "XAU".into();
        r.instrument_type = None;
        let p = classify(&r).unwrap();
        assert_eq!(p.sector, UNKNOWN);
        assert_eq!(p.geography, UNKNOWN);
        assert_eq!(p.average_price, None);
        assert_eq!(p.instrument_type, InstrumentType::Other);
    }

    #[test]
    fn zero_average_price_means_unknown_basis() {
        let mut r = raw("X");
        r.average_price = Some(0.0);
        assert_eq!(classify(&r).unwrap().average_price, None);
    }

    #[test]
    fn average_price_derived_from_lots() {
        let mut r = raw("X");
        r.average_price = None;
        r.lots = vec![
            RawTaxLot {
                quantity: 5.0,
                unit_cost: 80.0,
                acquired_on: NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
            },
            RawTaxLot {
                quantity: 5.0,
                unit_cost: 120.0,
                acquired_on: NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
            },
        ];
        let p = classify(&r).unwrap();
        assert_eq!(p.average_price, Some(100.0));
        assert_eq!(p.lots.len(), 2);
    }

    #[test]
    fn zero_quantity_is_kept() {
        let mut r = raw("X");
        r.quantity = 0.0;
        assert_eq!(classify(&r).unwrap().value(), 0.0);
    }

    #[test]
    fn negative_quantity_rejected() {
        let mut r = raw("X");
        r.quantity = -1.0;
        assert!(matches!(
            classify(&r),
            Err(ValidationError::Negative { field: "quantity", .. })
        ));
    }

    #[test]
    fn non_finite_price_rejected() {
        let mut r = raw("X");
        r.current_price = f64::NAN;
        assert!(matches!(
            classify(&r),
            Err(ValidationError::NotFinite { field: "currentPrice", .. })
        ));
    }

    #[test]
    fn malformed_currency_rejected() {
        let mut r = raw("X");
        r.currency = "US$".into();
        assert!(matches!(
            classify(&r),
            Err(ValidationError::UnknownCurrency { .. })
        ));
    }

    #[test]
    fn classify_all_rejects_duplicates() {
        let err = classify_all(&[raw("A"), raw("A")]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateInstrument("A".into()));
    }

    #[test]
    fn raw_position_reads_camel_case_json() {
        let json = r#"{
            "instrumentId": "SBER",
            "quantity": 100,
            "currentPrice": 250.5,
            "averagePrice": null,
            "currency": "RUB",
            "instrumentType": "share"
        }"#;
        let r: RawPosition = serde_json::from_str(json).unwrap();
        let p = classify(&r).unwrap();
        assert_eq!(p.geography, "russia");
        assert_eq!(p.sector, UNKNOWN);
    }

    #[test]
    fn operation_dates_accept_timestamps() {
        let op = classify_operation(&RawOperation {
            instrument_id: "A".into(),
            side: "Sell".into(),
            date: "2024-03-05T10:15:00+03:00".into(),
            quantity: 1.0,
            price: 10.0,
        })
        .unwrap();
        assert_eq!(op.side, Side::Sell);
        assert_eq!(op.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn operation_with_unknown_side_rejected() {
        let err = classify_operation(&RawOperation {
            instrument_id: "A".into(),
            side: "dividend".into(),
            date: "2024-03-05".into(),
            quantity: 1.0,
            price: 10.0,
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownSide { .. }));
    }
}
