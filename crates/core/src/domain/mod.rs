pub mod case;
pub mod classification;
pub mod conversation;
pub mod customer;
pub mod email;
pub mod escalation;
pub mod order;
pub mod trace;
pub mod validation;
