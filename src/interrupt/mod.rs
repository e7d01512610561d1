//! Generation tracking and interruption filtering.
//!
//! Every outbound request is tagged with a monotonically increasing
//! generation id. The remote streams asynchronously and may already have
//! queued output for a generation the user has since interrupted, so inbound
//! frames are attributed to a generation on arrival and filtered at delivery
//! time against the active generation.
//!
//! How frames are attributed depends on whether the worker marks the end of
//! each reply. See [`Attribution`].
//!
//! All state lives behind one lock so the send path and the receive path
//! observe generation changes atomically.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Default cap on requests awaiting a terminal frame.
pub const DEFAULT_MAX_OUTSTANDING: usize = 64;

/// Identifier of one generation (one utterance or transcription pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// How inbound frames are matched to generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The worker ends every request with a terminal frame. Frames belong to
    /// the oldest request still awaiting one, so a superseded generation
    /// absorbs its own late output.
    Ordered,
    /// The worker streams without end markers. Frames belong to whichever
    /// generation is active when they arrive; nothing is queued, so an
    /// unterminated reply can never hold back later generations.
    Latest,
}

#[derive(Debug, Default)]
struct ControllerState {
    active: Option<GenerationId>,
    outstanding: VecDeque<GenerationId>,
}

/// Tracks the active generation of one session.
pub struct InterruptionController {
    next: AtomicU64,
    state: Mutex<ControllerState>,
    attribution: Attribution,
    max_outstanding: usize,
}

impl InterruptionController {
    pub fn new() -> Self {
        Self::with_attribution(Attribution::Ordered)
    }

    pub fn with_attribution(attribution: Attribution) -> Self {
        Self {
            next: AtomicU64::new(1),
            state: Mutex::new(ControllerState::default()),
            attribution,
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
        }
    }

    pub fn with_max_outstanding(max_outstanding: usize) -> Self {
        Self {
            max_outstanding: max_outstanding.max(1),
            ..Self::new()
        }
    }

    pub fn attribution(&self) -> Attribution {
        self.attribution
    }

    /// Allocate a fresh generation id.
    pub fn next_id(&self) -> GenerationId {
        GenerationId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Mark `id` as the active generation. Returns the generation it replaced.
    pub fn begin_generation(&self, id: GenerationId) -> Option<GenerationId> {
        let mut state = self.state.lock();
        let previous = state.active.replace(id);
        if let Some(prev) = previous.filter(|p| *p != id) {
            debug!(superseded = %prev, active = %id, "generation superseded");
        }
        previous.filter(|p| *p != id)
    }

    /// True if `id` is the current active generation.
    pub fn is_active(&self, id: GenerationId) -> bool {
        self.state.lock().active == Some(id)
    }

    pub fn active(&self) -> Option<GenerationId> {
        self.state.lock().active
    }

    /// Invalidate the active generation without starting a new one.
    pub fn interrupt(&self) -> Option<GenerationId> {
        let interrupted = self.state.lock().active.take();
        if let Some(id) = interrupted {
            debug!(interrupted = %id, "generation interrupted");
        }
        interrupted
    }

    /// Record an outbound request that expects a terminal reply.
    ///
    /// With `supersede` set, or when nothing is active, a new generation is
    /// started; otherwise the request joins the active generation.
    pub fn register_request(&self, supersede: bool) -> (GenerationId, bool) {
        let mut state = self.state.lock();
        let current = state.active;
        let (id, started) = match current {
            Some(active) if !supersede => (active, false),
            previous => {
                let id = self.next_id();
                if let Some(prev) = previous {
                    debug!(superseded = %prev, active = %id, "generation superseded");
                }
                state.active = Some(id);
                (id, true)
            }
        };

        if self.attribution == Attribution::Latest {
            return (id, started);
        }
        state.outstanding.push_back(id);
        if state.outstanding.len() > self.max_outstanding {
            if let Some(dropped) = state.outstanding.pop_front() {
                warn!(
                    generation = %dropped,
                    cap = self.max_outstanding,
                    "outstanding request cap reached; forgetting oldest"
                );
            }
        }
        (id, started)
    }

    /// Generation that the next inbound frame belongs to.
    pub fn attribute(&self) -> Option<GenerationId> {
        let state = self.state.lock();
        match self.attribution {
            Attribution::Ordered => state.outstanding.front().copied(),
            Attribution::Latest => state.active,
        }
    }

    /// Retire the oldest outstanding request after its terminal frame.
    ///
    /// Returns the retired id and whether that generation still has
    /// requests awaiting replies. With [`Attribution::Latest`] nothing is
    /// queued and the active generation is reported as finished.
    pub fn retire(&self) -> Option<(GenerationId, bool)> {
        let mut state = self.state.lock();
        if self.attribution == Attribution::Latest {
            return state.active.map(|id| (id, false));
        }
        let id = state.outstanding.pop_front()?;
        let more = state.outstanding.contains(&id);
        Some((id, more))
    }

    /// Requests still awaiting a terminal frame.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Forget all generations. Used when the connection ends.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.active = None;
        state.outstanding.clear();
    }
}

impl Default for InterruptionController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let controller = InterruptionController::new();
        let a = controller.next_id();
        let b = controller.next_id();
        assert!(b > a);
    }

    #[test]
    fn test_begin_invalidates_previous() {
        let controller = InterruptionController::new();
        let first = controller.next_id();
        let second = controller.next_id();

        assert_eq!(controller.begin_generation(first), None);
        assert!(controller.is_active(first));

        assert_eq!(controller.begin_generation(second), Some(first));
        assert!(!controller.is_active(first));
        assert!(controller.is_active(second));
    }

    #[test]
    fn test_interrupt_clears_active() {
        let controller = InterruptionController::new();
        let id = controller.next_id();
        controller.begin_generation(id);

        assert_eq!(controller.interrupt(), Some(id));
        assert!(!controller.is_active(id));
        assert_eq!(controller.active(), None);
        assert_eq!(controller.interrupt(), None);
    }

    #[test]
    fn test_audio_requests_join_active_generation() {
        let controller = InterruptionController::new();
        let (first, started) = controller.register_request(false);
        assert!(started);
        let (second, started) = controller.register_request(false);
        assert!(!started);
        assert_eq!(first, second);
        assert_eq!(controller.outstanding(), 2);
    }

    #[test]
    fn test_superseding_request_starts_new_generation() {
        let controller = InterruptionController::new();
        let (first, _) = controller.register_request(true);
        let (second, started) = controller.register_request(true);
        assert!(started);
        assert_ne!(first, second);
        assert!(controller.is_active(second));

        // Late frames still attribute to the superseded generation first.
        assert_eq!(controller.attribute(), Some(first));
        assert_eq!(controller.retire(), Some((first, false)));
        assert_eq!(controller.attribute(), Some(second));
    }

    #[test]
    fn test_retire_reports_remaining_requests() {
        let controller = InterruptionController::new();
        let (id, _) = controller.register_request(false);
        controller.register_request(false);
        assert_eq!(controller.retire(), Some((id, true)));
        assert_eq!(controller.retire(), Some((id, false)));
        assert_eq!(controller.retire(), None);
    }

    #[test]
    fn test_outstanding_cap() {
        let controller = InterruptionController::with_max_outstanding(2);
        let (a, _) = controller.register_request(true);
        controller.register_request(true);
        controller.register_request(true);
        assert_eq!(controller.outstanding(), 2);
        assert_ne!(controller.attribute(), Some(a));
    }

    #[test]
    fn test_latest_attribution_follows_active_generation() {
        let controller = InterruptionController::with_attribution(Attribution::Latest);
        let (first, _) = controller.register_request(true);
        assert_eq!(controller.attribute(), Some(first));

        // The first reply never ends; the next prompt still gets its frames.
        let (second, started) = controller.register_request(true);
        assert!(started);
        assert_eq!(controller.attribute(), Some(second));
        assert_eq!(controller.outstanding(), 0);

        controller.interrupt();
        assert_eq!(controller.attribute(), None);
        assert_eq!(controller.retire(), None);
    }

    #[test]
    fn test_request_after_interrupt_starts_fresh() {
        let controller = InterruptionController::new();
        let (first, _) = controller.register_request(false);
        controller.interrupt();
        let (second, started) = controller.register_request(false);
        assert!(started);
        assert_ne!(first, second);
    }
}
