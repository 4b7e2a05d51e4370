use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of order driven through the lifecycle; each kind has its own transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Sample purchase order tied to a single inquiry
    PurchaseOrder,
    /// Bulk production order with first and final payment milestones
    BulkPurchaseOrder,
    /// Seller-side view of a bulk order, fulfilled by a factory
    SellerPurchaseOrder,
}

impl OrderKind {
    pub const ALL: [OrderKind; 3] = [
        Self::PurchaseOrder,
        Self::BulkPurchaseOrder,
        Self::SellerPurchaseOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "purchase_order",
            Self::BulkPurchaseOrder => "bulk_purchase_order",
            Self::SellerPurchaseOrder => "seller_purchase_order",
        }
    }

    /// Bulk orders pay in two milestones, every other kind pays once
    pub fn has_split_payment(&self) -> bool {
        matches!(self, Self::BulkPurchaseOrder)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase_order" => Ok(Self::PurchaseOrder),
            "bulk_purchase_order" => Ok(Self::BulkPurchaseOrder),
            "seller_purchase_order" => Ok(Self::SellerPurchaseOrder),
            _ => Err(format!("Invalid order kind: {s}")),
        }
    }
}

/// Production and fulfillment stage of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// Initial state for every new order
    #[default]
    Created,
    QuotationSent,
    Confirmed,
    WaitingForApproval,
    DesignApproved,
    DesignRejected,
    RawMaterial,
    /// Pre-production sample
    Pps,
    Production,
    Inspection,
    Qc,
    Making,
    Submit,
    Delivering,
    Delivered,
    /// Seller declined the purchase order; only cancellation remains
    PoRejected,
    Canceled,
    Refunded,
}

impl TrackingStatus {
    pub const ALL: [TrackingStatus; 18] = [
        Self::Created,
        Self::QuotationSent,
        Self::Confirmed,
        Self::WaitingForApproval,
        Self::DesignApproved,
        Self::DesignRejected,
        Self::RawMaterial,
        Self::Pps,
        Self::Production,
        Self::Inspection,
        Self::Qc,
        Self::Making,
        Self::Submit,
        Self::Delivering,
        Self::Delivered,
        Self::PoRejected,
        Self::Canceled,
        Self::Refunded,
    ];

    /// Check if this is a terminal state (production-stage actions are rejected)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled | Self::Refunded)
    }

    /// Check if the order is physically in production
    pub fn is_in_production(&self) -> bool {
        matches!(
            self,
            Self::RawMaterial
                | Self::Pps
                | Self::Production
                | Self::Inspection
                | Self::Qc
                | Self::Making
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::QuotationSent => "quotation_sent",
            Self::Confirmed => "confirmed",
            Self::WaitingForApproval => "waiting_for_approval",
            Self::DesignApproved => "design_approved",
            Self::DesignRejected => "design_rejected",
            Self::RawMaterial => "raw_material",
            Self::Pps => "pps",
            Self::Production => "production",
            Self::Inspection => "inspection",
            Self::Qc => "qc",
            Self::Making => "making",
            Self::Submit => "submit",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
            Self::PoRejected => "po_rejected",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid tracking status: {s}"))
    }
}

/// Payment sub-state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    /// Bulk: buyer reported the deposit transfer
    FirstPaymentPending,
    FirstPaymentConfirmed,
    /// Bulk: buyer reported the balance transfer
    FinalPaymentPending,
    FinalPaymentConfirmed,
    /// Single-milestone kinds: buyer reported the transfer
    PaymentPending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 8] = [
        Self::Unpaid,
        Self::FirstPaymentPending,
        Self::FirstPaymentConfirmed,
        Self::FinalPaymentPending,
        Self::FinalPaymentConfirmed,
        Self::PaymentPending,
        Self::Paid,
        Self::Refunded,
    ];

    /// Fully settled: nothing left to collect
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::FinalPaymentConfirmed | Self::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::FirstPaymentPending => "first_payment_pending",
            Self::FirstPaymentConfirmed => "first_payment_confirmed",
            Self::FinalPaymentPending => "final_payment_pending",
            Self::FinalPaymentConfirmed => "final_payment_confirmed",
            Self::PaymentPending => "payment_pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid payment status: {s}"))
    }
}
