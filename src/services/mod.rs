pub mod entitlement_gate;
pub mod reconciler;
