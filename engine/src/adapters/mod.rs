//! Driving adapters: the control-plane server and its socket client

pub mod client;
pub mod rest;

pub use client::ControlClient;
