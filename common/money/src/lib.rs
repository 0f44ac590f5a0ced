use bigdecimal::{BigDecimal, ToPrimitive};

/// Normalize a monetary value to 2 decimal places. `with_scale` truncates or
/// pads with zeros; callers are expected to normalize once at the boundary and
/// pass the result around.
pub fn normalize_scale(value: &BigDecimal) -> BigDecimal {
    value.with_scale(2)
}

/// Convert a normalized amount to vendor minor units (cents). Returns None
/// when the value does not fit an i64. Exact for inputs already at scale 2.
pub fn to_minor_units(value: &BigDecimal) -> Option<i64> {
    let cents = (normalize_scale(value) * BigDecimal::from(100)).with_scale(0);
    cents.to_i64()
}

/// True when the amount is a usable charge amount (strictly positive).
pub fn is_positive_amount(value: &BigDecimal) -> bool {
    *value > BigDecimal::from(0)
}
