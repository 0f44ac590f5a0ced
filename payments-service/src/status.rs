use serde::{Deserialize, Serialize};

/// Platform-wide canonical payment status. Every vendor status string maps
/// into this enum; vendor-specific values never leak past the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn from_str(s: &str) -> Option<PaymentStatus> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Terminal for reconciliation purposes: webhooks never move a payment
    /// out of these states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed, case-insensitive vendor status table. Unrecognized strings default
/// to PENDING so an unknown vendor state can never be mistaken for money
/// received.
pub fn map_vendor_status(vendor_status: &str) -> PaymentStatus {
    match vendor_status.to_ascii_lowercase().as_str() {
        "succeeded" | "success" | "paid" => PaymentStatus::Success,
        "pending" | "processing" => PaymentStatus::Pending,
        "failed" | "cancelled" | "error" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Valid transitions:
/// PENDING -> SUCCESS | FAILED (reconciliation)
/// SUCCESS | FAILED -> REFUNDED (explicit refund path only)
/// No transition is reversible.
pub fn is_valid_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    match from {
        PaymentStatus::Pending => {
            matches!(to, PaymentStatus::Success | PaymentStatus::Failed)
        }
        PaymentStatus::Success | PaymentStatus::Failed => {
            matches!(to, PaymentStatus::Refunded)
        }
        PaymentStatus::Refunded => false,
    }
}
