//! LiqPay Billing - subscription billing driven by LiqPay callbacks
//!
//! This crate authenticates and reconciles LiqPay server callbacks, drives the
//! subscription lifecycle state machine, creates checkout sessions, cancels
//! provider agreements and runs the trial reminder/expiry jobs.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
