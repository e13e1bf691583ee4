//! Monitor events: types and payloads.
//!
//! This module groups the event **data model** emitted by a
//! [`ProcessMonitor`](crate::ProcessMonitor) while it watches one execution.
//!
//! ## Contents
//! - [`MonitorEventKind`], [`MonitorEvent`] event classification and payload
//! - [`Payload`] key/value map shared with line parsers
//!
//! ## Quick reference
//! - **Publishers**: the monitor's stdout, stderr and state loops.
//! - **Consumers**: observers registered on the monitor, through an
//!   [`ObserverSet`](crate::ObserverSet) (one bounded queue per observer).
//!
//! Events are ephemeral: they are not retained after delivery.

mod event;

pub use event::{MonitorEvent, MonitorEventKind, Payload};
