// ── Reactive controller registry ──
//
// Versioned copy-on-write storage with push-based change-set notification.

mod registry;

pub(crate) use registry::{ControllerRegistry, RegistrySnapshot};
