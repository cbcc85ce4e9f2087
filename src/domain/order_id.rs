use chrono::{DateTime, Utc};

const MAX_FALLBACK_DIGITS: usize = 9;
const TIME_MODULUS: i64 = 1_000_000_000;

/// Inclusive numeric window the bank assigned to this merchant for `OrderID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderIdRange {
    pub min: i64,
    pub max: i64,
}

impl OrderIdRange {
    /// Only a strictly increasing, positive window is usable.
    pub fn new(min: Option<i64>, max: Option<i64>) -> Option<Self> {
        match (min, max) {
            (Some(min), Some(max)) if min > 0 && min < max => Some(Self { min, max }),
            _ => None,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

/// 32-bit polynomial hash (`h * 31 + c` via shift-and-subtract) over UTF-16 code units,
/// wrapping on overflow.
pub fn order_number_hash(order_number: &str) -> i32 {
    order_number.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Maps an internal order number to the gateway's numeric `OrderID`.
///
/// With a range the result is `min + |hash| mod (max - min + 1)`, so retries of the same
/// order always hit the bank's duplicate-order check with the same id. Without one, the
/// first nine digits of the order number are used, falling back to a clock-derived value.
/// The result is never below 1.
pub fn map_order_id(order_number: &str, range: Option<OrderIdRange>, now: DateTime<Utc>) -> i64 {
    if let Some(range) = range {
        let span = (range.max - range.min + 1) as u64;
        let offset = u64::from(order_number_hash(order_number).unsigned_abs()) % span;
        let id = range.min + offset as i64;
        if id > 0 {
            return id;
        }
    }

    let digits: String = order_number
        .chars()
        .filter(char::is_ascii_digit)
        .take(MAX_FALLBACK_DIGITS)
        .collect();

    match digits.parse::<i64>() {
        Ok(id) if id > 0 => id,
        _ => clock_order_id(now),
    }
}

fn clock_order_id(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().rem_euclid(TIME_MODULUS).max(1)
}
