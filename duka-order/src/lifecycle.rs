//! Order status state machine.
//!
//! `pending → processing → shipped → delivered`, with `cancelled` reachable
//! from the non-terminal states. The engine applies these rules through a
//! [`TransitionPolicy`]; the default lets any status overwrite any other.

use serde::Deserialize;

use crate::models::OrderStatus;

const FLOW: [OrderStatus; 4] = [
    OrderStatus::Pending,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// The next status in the fulfilment flow. Terminal states return
    /// themselves.
    pub fn advance(&self) -> OrderStatus {
        match FLOW.iter().position(|s| s == self) {
            Some(idx) if idx + 1 < FLOW.len() => FLOW[idx + 1],
            _ => *self,
        }
    }

    pub fn cancel(&self) -> OrderStatus {
        OrderStatus::Cancelled
    }
}

/// Which status changes the engine accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any recognised status may be written over any other.
    #[default]
    Permissive,
    /// Only single-step advances, cancellation of a live order, or
    /// re-asserting the current status.
    Sequential,
}

/// Whether a payment outcome can block the status write it rides on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPolicy {
    /// The outcome is logged; the status write always happens.
    #[default]
    Advisory,
    /// The write is refused unless the gateway accepted the push.
    RequireAccepted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LifecyclePolicy {
    #[serde(default)]
    pub transitions: TransitionPolicy,
    #[serde(default)]
    pub payment: PaymentPolicy,
}

impl TransitionPolicy {
    pub fn permits(&self, from: OrderStatus, to: OrderStatus) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Sequential => {
                from == to
                    || (!from.is_terminal() && to == from.advance())
                    || (!from.is_terminal() && to == OrderStatus::Cancelled)
            }
        }
    }
}
