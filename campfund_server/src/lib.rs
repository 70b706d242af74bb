//! # Campfund server
//! The server is the network face of the Campfund reconciliation engine. It is responsible for:
//! * Receiving payment notifications from the push gateway and the bank feed, and handing them to the engine.
//! * Opening donations and issuing the order codes both gateways report against.
//! * Running the outbox relay and the campaign status jobs in the background.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /donations`: Opens a donation.
//! * `POST /webhooks/push`: Push gateway notifications.
//! * `POST /webhooks/bank-feed`: Bank feed notifications.
pub mod cache;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod event_handlers;
pub mod outbox_worker;
pub mod routes;
pub mod scheduler_worker;
pub mod server;
pub mod webhooks;

#[cfg(test)]
mod endpoint_tests;
