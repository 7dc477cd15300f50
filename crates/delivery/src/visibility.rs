//! Viewport membership tracking for media placeholders.
//!
//! The tracker mirrors the document's scroll state: each registered slot is
//! a vertical extent, and the tracker emits a "became relevant" event the
//! first time a slot enters the imminent band (within one viewport height
//! of the fold) and again when it becomes immediately visible. Relevance
//! only ever upgrades; a slot scrolled back out of view is not re-announced.

use std::collections::HashMap;

use aula_core::{CourseCategory, MediaKind};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

/// Identity of one media placeholder in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u64);

/// How close to the viewport a slot is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relevance {
    /// Within one viewport height of the visible region
    Imminent,
    /// Intersecting the visible region
    Immediate,
}

/// Rendering state a slot is marked with once its load settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMark {
    /// No load has settled yet
    Pending,
    /// Primary or quality-adjusted variant is showing
    Loaded,
    /// A fallback source is showing; surface a retry affordance
    Degraded,
    /// Every source failed; surface the unavailable affordance
    Unavailable,
}

/// One registered media placeholder
#[derive(Debug, Clone)]
pub struct MediaSlot {
    pub id: SlotId,
    pub resource: Url,
    pub kind: MediaKind,
    pub category: Option<CourseCategory>,
    /// Document offset of the slot's top edge, in pixels
    pub top: i64,
    /// Rendered height, in pixels
    pub height: i64,
}

/// Current scroll window over the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub scroll_top: i64,
    pub height: i64,
}

impl Viewport {
    fn relevance_of(&self, slot: &MediaSlot) -> Option<Relevance> {
        let slot_bottom = slot.top + slot.height;
        if slot_bottom > self.scroll_top && slot.top < self.scroll_top + self.height {
            return Some(Relevance::Immediate);
        }

        let near_top = self.scroll_top - self.height;
        let near_bottom = self.scroll_top + 2 * self.height;
        if slot_bottom > near_top && slot.top < near_bottom {
            return Some(Relevance::Imminent);
        }

        None
    }
}

/// Event emitted when a slot first reaches a relevance level
#[derive(Debug, Clone)]
pub struct VisibilityEvent {
    pub slot: SlotId,
    pub resource: Url,
    pub kind: MediaKind,
    pub category: Option<CourseCategory>,
    pub relevance: Relevance,
}

struct SlotState {
    slot: MediaSlot,
    announced: Option<Relevance>,
    mark: SlotMark,
}

struct Inner {
    slots: HashMap<SlotId, SlotState>,
    viewport: Viewport,
}

/// Observes slot/viewport geometry and announces newly relevant slots
pub struct VisibilityTracker {
    inner: Mutex<Inner>,
    events_tx: mpsc::UnboundedSender<VisibilityEvent>,
}

impl VisibilityTracker {
    pub fn new(viewport: Viewport) -> (Self, mpsc::UnboundedReceiver<VisibilityEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let tracker = Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                viewport,
            }),
            events_tx,
        };
        (tracker, events_rx)
    }

    /// Register a slot; announces immediately if it is already relevant
    pub fn observe(&self, slot: MediaSlot) {
        let mut inner = self.inner.lock();
        let relevance = inner.viewport.relevance_of(&slot);
        let id = slot.id;

        inner.slots.insert(
            id,
            SlotState {
                slot,
                announced: None,
                mark: SlotMark::Pending,
            },
        );

        if let Some(level) = relevance {
            self.announce(&mut inner, id, level);
        }
    }

    /// Drop a slot whose placeholder left the document
    pub fn unobserve(&self, id: SlotId) -> Option<Url> {
        let mut inner = self.inner.lock();
        inner.slots.remove(&id).map(|state| state.slot.resource)
    }

    /// Whether any slot still wants this resource
    pub fn is_wanted(&self, resource: &Url) -> bool {
        let inner = self.inner.lock();
        inner
            .slots
            .values()
            .any(|state| &state.slot.resource == resource)
    }

    /// Update the scroll window and announce any newly relevant slots
    pub fn set_viewport(&self, viewport: Viewport) {
        let mut inner = self.inner.lock();
        inner.viewport = viewport;

        let upgrades: Vec<(SlotId, Relevance)> = inner
            .slots
            .values()
            .filter_map(|state| {
                let relevance = viewport.relevance_of(&state.slot)?;
                match state.announced {
                    Some(previous) if previous >= relevance => None,
                    _ => Some((state.slot.id, relevance)),
                }
            })
            .collect();

        for (id, relevance) in upgrades {
            self.announce(&mut inner, id, relevance);
        }
    }

    /// Record the settled rendering state of a slot
    pub fn apply_mark(&self, id: SlotId, mark: SlotMark) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.slots.get_mut(&id) {
            state.mark = mark;
        }
    }

    /// Mark every slot currently bound to a resource.
    ///
    /// Several placeholders may show the same asset; a settled load
    /// applies to all of them.
    pub fn mark_resource(&self, resource: &Url, mark: SlotMark) {
        let mut inner = self.inner.lock();
        for state in inner.slots.values_mut() {
            if &state.slot.resource == resource {
                state.mark = mark;
            }
        }
    }

    pub fn mark_of(&self, id: SlotId) -> Option<SlotMark> {
        let inner = self.inner.lock();
        inner.slots.get(&id).map(|state| state.mark)
    }

    pub fn observed_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    fn announce(&self, inner: &mut Inner, id: SlotId, relevance: Relevance) {
        if let Some(state) = inner.slots.get_mut(&id) {
            state.announced = Some(relevance);
            let event = VisibilityEvent {
                slot: id,
                resource: state.slot.resource.clone(),
                kind: state.slot.kind,
                category: state.slot.category,
                relevance,
            };
            // Receiver dropped means the pipeline is shutting down.
            let _ = self.events_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u64, top: i64) -> MediaSlot {
        MediaSlot {
            id: SlotId(id),
            resource: Url::parse(&format!("https://img.aulacdn.net/covers/c{}.webp", id)).unwrap(),
            kind: MediaKind::Course,
            category: None,
            top,
            height: 200,
        }
    }

    fn viewport(scroll_top: i64) -> Viewport {
        Viewport {
            scroll_top,
            height: 800,
        }
    }

    #[test]
    fn test_observe_announces_visible_slot() {
        let (tracker, mut events) = VisibilityTracker::new(viewport(0));
        tracker.observe(slot(1, 100));

        let event = events.try_recv().unwrap();
        assert_eq!(event.slot, SlotId(1));
        assert_eq!(event.relevance, Relevance::Immediate);
    }

    #[test]
    fn test_imminent_band_is_one_viewport_height() {
        let (tracker, mut events) = VisibilityTracker::new(viewport(0));

        // Just below the fold, inside the imminent band.
        tracker.observe(slot(1, 900));
        assert_eq!(events.try_recv().unwrap().relevance, Relevance::Imminent);

        // Two viewport heights down, outside the band.
        tracker.observe(slot(2, 2400));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_scroll_upgrades_to_immediate_once() {
        let (tracker, mut events) = VisibilityTracker::new(viewport(0));
        tracker.observe(slot(1, 900));
        assert_eq!(events.try_recv().unwrap().relevance, Relevance::Imminent);

        tracker.set_viewport(viewport(400));
        assert_eq!(events.try_recv().unwrap().relevance, Relevance::Immediate);

        // Scrolling within the same relevance emits nothing further.
        tracker.set_viewport(viewport(500));
        assert!(events.try_recv().is_err());

        // Scrolling away and back does not re-announce.
        tracker.set_viewport(viewport(5000));
        tracker.set_viewport(viewport(400));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_unobserve_releases_resource() {
        let (tracker, _events) = VisibilityTracker::new(viewport(0));
        let s = slot(1, 100);
        let resource = s.resource.clone();
        tracker.observe(s);

        assert!(tracker.is_wanted(&resource));
        assert_eq!(tracker.unobserve(SlotId(1)).unwrap(), resource);
        assert!(!tracker.is_wanted(&resource));
    }

    #[test]
    fn test_marks() {
        let (tracker, _events) = VisibilityTracker::new(viewport(0));
        tracker.observe(slot(1, 100));

        assert_eq!(tracker.mark_of(SlotId(1)), Some(SlotMark::Pending));
        tracker.apply_mark(SlotId(1), SlotMark::Degraded);
        assert_eq!(tracker.mark_of(SlotId(1)), Some(SlotMark::Degraded));
    }
}
