//! Muster Server - registry API
//!
//! HTTP front of the registry store:
//! - `POST /register` upserts an instance and announces new members on the bus
//! - `GET /services` lists every live instance
//! - `GET /services/{name}` lists the live instances of one service

pub mod api;
pub mod error;
pub mod model;
pub mod service;
pub mod startup;
