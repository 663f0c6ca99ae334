//! Background discovery and reactive caching for HID input controllers.
//!
//! `padwatch` keeps a versioned registry of attached input controllers
//! (joysticks, gamepads, multi-axis devices) continuously reconciled against
//! whatever the platform backend currently sees, and publishes fine-grained
//! change notifications plus a merged stream of control-value changes:
//!
//! - **[`DeviceWatcher`]** — Central facade. [`spawn()`](DeviceWatcher::spawn)
//!   injects a [`DeviceBackend`] and [`DescriptorParser`] and starts the
//!   background reconciliation loop; [`teardown()`](DeviceWatcher::teardown)
//!   releases everything. Hot-plug notifications and
//!   [`refresh()`](DeviceWatcher::refresh) calls coalesce into single passes.
//!
//! - **Registry** — Versioned copy-on-write storage: one live [`Controller`]
//!   per device path, swapped atomically per batch edit. Readers always see
//!   a fully-committed generation without taking locks.
//!
//! - **[`UpdateStream`]** — Change-set subscription vended by
//!   [`updates()`](DeviceWatcher::updates): current state as synthetic Adds,
//!   then every commit in order.
//!
//! - **[`ControlStream`]** — Merged per-control change stream from
//!   [`changes()`](DeviceWatcher::changes), following registry membership so
//!   removed controllers stop contributing.
//!
//! - **Reports** ([`report`]) — Fire-and-forget observability events
//!   (adds, removals, per-device failures, pass failures) with a static
//!   severity/message catalog.
//!
//! The crate never touches USB/HID itself: enumeration, descriptor reads,
//! and structural descriptor parsing live behind the [`backend`] traits.

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod hid;
pub mod report;
pub mod stream;
pub mod watcher;

mod store;
mod trigger;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{DescriptorParser, DeviceBackend, DeviceHandle};
pub use config::WatcherConfig;
pub use controller::{ControlChange, Controller};
pub use error::{BackendError, WatchError};
pub use hid::{
    DataField, DescriptorItem, DeviceItem, DeviceKind, ParsedDescriptor, Usage,
};
pub use report::{Report, ReportKind, Severity};
pub use stream::{Change, ChangeReason, ChangeSet, ControlStream, UpdateStream};
pub use watcher::DeviceWatcher;
