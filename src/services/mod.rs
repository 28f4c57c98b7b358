pub mod forwarding;
pub mod message_router;
pub mod pins;
pub mod presence;
pub mod reactions;
pub mod receipts;
pub mod revocation;
pub mod typing;
