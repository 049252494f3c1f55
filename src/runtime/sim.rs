//! In-memory native runtime.
//!
//! [`SimRuntime`] behaves like a native runtime without doing any media
//! work. It records every unit it creates, every pad requested, every link
//! and every state transition, and lets callers inject failures:
//!
//! ```rust
//! use stream_compose::runtime::sim::SimRuntime;
//! use stream_compose::runtime::NativeRuntime;
//!
//! let runtime = SimRuntime::new();
//! runtime.fail_kind("nvinferserver");
//!
//! assert!(runtime.make_unit("nvinferserver", "infer").is_none());
//! assert!(runtime.make_unit("queue", "q").is_some());
//! ```
//!
//! Messages can be posted to every attached bus with [`SimRuntime::post`].

use super::{NativeRuntime, NativeUnit, Pad, PadPresence, PadTemplate, PropertyValue, UnitState};
use crate::error::{Error, Result};
use crate::pipeline::{BusMessage, BusSender};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pad templates for a unit kind.
///
/// Source kinds only expose `src`, sink kinds only `sink`, multiplexing kinds
/// expose `sink_%u` request pads plus `src`; everything else is a filter.
pub fn default_templates(kind: &str) -> Vec<PadTemplate> {
    match kind {
        "uridecodebin" | "videotestsrc" | "filesrc" => vec![PadTemplate::src()],
        "nveglglessink" | "fakesink" | "filesink" => vec![PadTemplate::sink()],
        "nvstreammux" | "bin" => vec![PadTemplate::request_sinks(), PadTemplate::src()],
        _ => vec![PadTemplate::sink(), PadTemplate::src()],
    }
}

#[derive(Debug, Default)]
struct Faults {
    kinds: HashSet<String>,
    pads: HashSet<(String, String)>,
    links: HashSet<(String, String)>,
    states: HashSet<(String, UnitState)>,
}

#[derive(Debug, Default)]
struct Shared {
    faults: Faults,
    templates: HashMap<String, Vec<PadTemplate>>,
    units: Vec<Arc<SimUnit>>,
    links: Vec<(Pad, Pad)>,
    buses: Vec<BusSender>,
}

/// In-memory [`NativeRuntime`].
#[derive(Debug, Clone, Default)]
pub struct SimRuntime {
    shared: Arc<Mutex<Shared>>,
}

impl SimRuntime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the pad templates for a unit kind.
    pub fn register_kind(&self, kind: &str, templates: Vec<PadTemplate>) {
        lock(&self.shared)
            .templates
            .insert(kind.to_string(), templates);
    }

    /// Make every future allocation of `kind` fail.
    pub fn fail_kind(&self, kind: &str) {
        lock(&self.shared).faults.kinds.insert(kind.to_string());
    }

    /// Hide pad `pad` of unit `unit` (static or request).
    pub fn remove_pad(&self, unit: &str, pad: &str) {
        lock(&self.shared)
            .faults
            .pads
            .insert((unit.to_string(), pad.to_string()));
    }

    /// Refuse every link from unit `src` to unit `sink`.
    pub fn refuse_link(&self, src: &str, sink: &str) {
        lock(&self.shared)
            .faults
            .links
            .insert((src.to_string(), sink.to_string()));
    }

    /// Make unit `unit` refuse transitions to `state`.
    pub fn refuse_state(&self, unit: &str, state: UnitState) {
        lock(&self.shared)
            .faults
            .states
            .insert((unit.to_string(), state));
    }

    /// Post a message on every attached bus. Returns how many buses took it.
    pub fn post(&self, message: BusMessage) -> usize {
        let mut shared = lock(&self.shared);
        shared.buses.retain(|bus| !bus.is_closed());
        shared
            .buses
            .iter()
            .filter(|bus| bus.post(message.clone()))
            .count()
    }

    /// Number of attached buses whose consumer is still alive.
    pub fn bus_count(&self) -> usize {
        let mut shared = lock(&self.shared);
        shared.buses.retain(|bus| !bus.is_closed());
        shared.buses.len()
    }

    /// Drop every attached bus sender, as a runtime going away would.
    pub fn detach_buses(&self) {
        lock(&self.shared).buses.clear();
    }

    /// Every unit created so far, in creation order.
    pub fn units(&self) -> Vec<Arc<SimUnit>> {
        lock(&self.shared).units.clone()
    }

    /// Look up a created unit by name.
    pub fn unit(&self, name: &str) -> Option<Arc<SimUnit>> {
        lock(&self.shared)
            .units
            .iter()
            .find(|u| u.name == name)
            .cloned()
    }

    /// Every accepted link, in link order.
    pub fn links(&self) -> Vec<(Pad, Pad)> {
        lock(&self.shared).links.clone()
    }

    /// Links whose sink pad belongs to `unit`.
    pub fn links_into(&self, unit: &str) -> Vec<(Pad, Pad)> {
        lock(&self.shared)
            .links
            .iter()
            .filter(|(_, sink)| sink.unit() == unit)
            .cloned()
            .collect()
    }

    fn templates(&self, kind: &str) -> Vec<PadTemplate> {
        lock(&self.shared)
            .templates
            .get(kind)
            .cloned()
            .unwrap_or_else(|| default_templates(kind))
    }
}

impl NativeRuntime for SimRuntime {
    fn make_unit(&self, kind: &str, name: &str) -> Option<super::UnitRef> {
        let templates = self.templates(kind);
        let mut shared = lock(&self.shared);
        if shared.faults.kinds.contains(kind) {
            tracing::debug!(kind, name, "simulated allocation failure");
            return None;
        }
        let unit = Arc::new(SimUnit {
            name: name.to_string(),
            kind: kind.to_string(),
            templates,
            shared: Arc::downgrade(&self.shared),
            inner: Mutex::new(UnitInner::default()),
        });
        shared.units.push(unit.clone());
        Some(unit)
    }

    fn link(&self, src: &Pad, sink: &Pad) -> bool {
        let mut shared = lock(&self.shared);
        if !src.is_src() || !sink.is_sink() {
            return false;
        }
        let key = (src.unit().to_string(), sink.unit().to_string());
        if shared.faults.links.contains(&key) {
            return false;
        }
        // A sink pad accepts a single upstream peer.
        if shared.links.iter().any(|(_, s)| s == sink) {
            return false;
        }
        shared.links.push((src.clone(), sink.clone()));
        true
    }

    fn attach_bus(&self, bus: BusSender) {
        let mut shared = lock(&self.shared);
        shared.buses.retain(|bus| !bus.is_closed());
        shared.buses.push(bus);
    }
}

#[derive(Debug, Default)]
struct UnitInner {
    state: UnitState,
    history: Vec<UnitState>,
    properties: HashMap<String, PropertyValue>,
    requested: Vec<String>,
}

/// A unit created by [`SimRuntime`].
#[derive(Debug)]
pub struct SimUnit {
    name: String,
    kind: String,
    templates: Vec<PadTemplate>,
    shared: std::sync::Weak<Mutex<Shared>>,
    inner: Mutex<UnitInner>,
}

impl SimUnit {
    /// Every state the unit was moved to, in order.
    pub fn state_history(&self) -> Vec<UnitState> {
        lock(&self.inner).history.clone()
    }

    /// Whether the unit was ever moved to `state`.
    pub fn was_in(&self, state: UnitState) -> bool {
        lock(&self.inner).history.contains(&state)
    }

    /// Number of transitions from a live state back to `Null`.
    pub fn teardown_count(&self) -> usize {
        let inner = lock(&self.inner);
        let mut previous = UnitState::Null;
        let mut count = 0;
        for &state in &inner.history {
            if state == UnitState::Null && previous != UnitState::Null {
                count += 1;
            }
            previous = state;
        }
        count
    }

    /// Names of request pads handed out, in request order.
    pub fn requested_pads(&self) -> Vec<String> {
        lock(&self.inner).requested.clone()
    }

    fn pad_hidden(&self, pad: &str) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            lock(&shared)
                .faults
                .pads
                .contains(&(self.name.clone(), pad.to_string()))
        })
    }

    fn state_refused(&self, state: UnitState) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            lock(&shared)
                .faults
                .states
                .contains(&(self.name.clone(), state))
        })
    }
}

impl NativeUnit for SimUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn static_pad(&self, name: &str) -> Option<Pad> {
        if self.pad_hidden(name) {
            return None;
        }
        self.templates
            .iter()
            .find(|t| t.presence == PadPresence::Always && t.matches(name))
            .map(|t| Pad::new(&self.name, name, t.direction))
    }

    fn request_pad(&self, name: &str) -> Option<Pad> {
        if self.pad_hidden(name) {
            return None;
        }
        let template = self
            .templates
            .iter()
            .find(|t| t.presence == PadPresence::Request && t.matches(name))?;
        let mut inner = lock(&self.inner);
        if inner.requested.iter().any(|p| p == name) {
            return None;
        }
        inner.requested.push(name.to_string());
        Some(Pad::new(&self.name, name, template.direction))
    }

    fn set_property(&self, key: &str, value: PropertyValue) -> Result<()> {
        lock(&self.inner).properties.insert(key.to_string(), value);
        Ok(())
    }

    fn property(&self, key: &str) -> Option<PropertyValue> {
        lock(&self.inner).properties.get(key).cloned()
    }

    fn set_state(&self, state: UnitState) -> Result<()> {
        if self.state_refused(state) {
            return Err(Error::StateChange {
                unit: self.name.clone(),
                state: state.to_string(),
            });
        }
        let mut inner = lock(&self.inner);
        inner.state = state;
        inner.history.push(state);
        Ok(())
    }

    fn state(&self) -> UnitState {
        lock(&self.inner).state
    }
}
