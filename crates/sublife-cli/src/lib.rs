//! # sublife-cli — Subscription Lifecycle Command-Line Interface
//!
//! Scheduler- and operator-facing surface over the lifecycle engine.
//!
//! ## Subcommands
//!
//! - `migrate` — apply the embedded Postgres schema
//! - `trigger` — run one scheduled trigger and print its count
//! - `create`, `show`, `list` — record access
//! - `cancel-autorenew`, `enable-autorenew`, `renew`, `renewed`,
//!   `renewal-failed`, `state-unknown`, `end` — transitions by id
//!
//! ## Crate Policy
//!
//! - Argument parsing is separated from business logic.
//! - Handlers delegate to `sublife-engine`; no lifecycle rules live here.
//! - Logs go to stderr; stdout carries only command output.

pub mod context;
pub mod subscription;
pub mod trigger;
