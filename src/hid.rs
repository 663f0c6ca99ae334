// ── HID usage model and item recognition ──
//
// Structural descriptor parsing is external (see `DescriptorParser`); this
// module owns what the engine does with the parsed result: classifying each
// application collection into a `DeviceKind` and collecting its axis-capable
// input usages. Classification is an explicit ordered list of
// (predicate, kind) pairs — first match wins, no dynamic dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generic Desktop usage page.
pub const GENERIC_DESKTOP: u16 = 0x01;

/// Generic Desktop usage ids recognized by the classifier and axis predicate.
pub mod usage_id {
    pub const JOYSTICK: u16 = 0x04;
    pub const GAMEPAD: u16 = 0x05;
    pub const MULTI_AXIS: u16 = 0x08;

    /// X..Wheel — the axis-capable band of the Generic Desktop page.
    pub const AXIS_FIRST: u16 = 0x30;
    pub const AXIS_LAST: u16 = 0x39;
}

/// Standardized numeric tag giving semantic meaning to a data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usage {
    pub page: u16,
    pub id: u16,
}

impl Usage {
    pub const fn new(page: u16, id: u16) -> Self {
        Self { page, id }
    }

    /// Generic Desktop shorthand.
    pub const fn generic_desktop(id: u16) -> Self {
        Self::new(GENERIC_DESKTOP, id)
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.page, self.id)
    }
}

/// Classified type of one recognized device item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize, Deserialize)]
pub enum DeviceKind {
    Joystick,
    Gamepad,
    MultiAxis,
}

/// One input-report data field as produced by the external parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub usage: Usage,
    pub logical_min: i32,
    pub logical_max: i32,
}

/// One application collection from the parsed descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DescriptorItem {
    /// Usages declared on the collection itself.
    pub usages: Vec<Usage>,
    /// Data fields of the collection's input reports.
    pub inputs: Vec<DataField>,
}

/// Structured output of the external descriptor parser.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedDescriptor {
    pub items: Vec<DescriptorItem>,
}

/// One addressable sub-unit of a device with a classified type and its
/// axis-capable usages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceItem {
    pub kind: DeviceKind,
    pub axes: Vec<Usage>,
}

// ── Classification ──────────────────────────────────────────────────

fn is_joystick(u: Usage) -> bool {
    u.page == GENERIC_DESKTOP && u.id == usage_id::JOYSTICK
}

fn is_gamepad(u: Usage) -> bool {
    u.page == GENERIC_DESKTOP && u.id == usage_id::GAMEPAD
}

fn is_multi_axis(u: Usage) -> bool {
    u.page == GENERIC_DESKTOP && u.id == usage_id::MULTI_AXIS
}

/// Ordered classifier list — first matching entry decides the kind.
const CLASSIFIERS: &[(fn(Usage) -> bool, DeviceKind)] = &[
    (is_joystick, DeviceKind::Joystick),
    (is_gamepad, DeviceKind::Gamepad),
    (is_multi_axis, DeviceKind::MultiAxis),
];

/// Resolve a device kind from a collection's usages. `None` means the
/// item is not a recognized input controller and is discarded.
pub fn classify(usages: &[Usage]) -> Option<DeviceKind> {
    CLASSIFIERS
        .iter()
        .find(|(pred, _)| usages.iter().any(|u| pred(*u)))
        .map(|&(_, kind)| kind)
}

/// Whether a data-field usage is axis-capable.
pub fn is_axis_usage(u: Usage) -> bool {
    u.page == GENERIC_DESKTOP && (usage_id::AXIS_FIRST..=usage_id::AXIS_LAST).contains(&u.id)
}

/// Reduce a parsed descriptor to its recognized device items.
///
/// Items with no matching classifier or zero axis usages are discarded.
/// Axis usages keep first-seen order and are deduplicated.
pub fn recognize_items(descriptor: &ParsedDescriptor) -> Vec<DeviceItem> {
    descriptor
        .items
        .iter()
        .filter_map(|item| {
            let kind = classify(&item.usages)?;
            let mut axes: Vec<Usage> = Vec::new();
            for field in &item.inputs {
                if is_axis_usage(field.usage) && !axes.contains(&field.usage) {
                    axes.push(field.usage);
                }
            }
            if axes.is_empty() {
                return None;
            }
            Some(DeviceItem { kind, axes })
        })
        .collect()
}
