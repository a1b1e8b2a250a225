//! Application layer: the settlement state machine that runs server-side
//! and the checkout flow that drives it from the client side.

pub mod enrollment;
pub mod payment_flow;
