//! HTTP request handlers for the REST API.

pub mod concierge;
pub mod crm;
pub mod events;
pub mod pos;
pub mod quotation;
pub mod session;
pub mod tasks;
