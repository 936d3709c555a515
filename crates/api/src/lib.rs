//! HTTP surface for the Courier notification service. Translates requests
//! to and from engine calls; all business decisions live in the engine.

pub mod routes;
pub mod state;
