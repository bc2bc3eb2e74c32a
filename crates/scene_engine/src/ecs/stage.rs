//! Per-component process stage tracking
//!
//! A component runs `Create → Load → Logic → PreRender → Render` on its
//! first frame and `Logic → PreRender → Render` on every frame after that.
//! Nothing is skipped and nothing re-enters an earlier stage except through
//! an explicit [`StageTracker::reset`].

use std::fmt;

/// Processing stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessStage {
    /// Attach-time wiring to sibling components
    Create,
    /// One-time GPU setup
    Load,
    /// Per-frame recompute
    Logic,
    /// Per-frame upload preparation
    PreRender,
    /// Per-frame drawing
    Render,
}

impl ProcessStage {
    /// Every stage in execution order
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Load,
        Self::Logic,
        Self::PreRender,
        Self::Render,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Create => 0,
            Self::Load => 1,
            Self::Logic => 2,
            Self::PreRender => 3,
            Self::Render => 4,
        }
    }

    /// Stage that may legally follow `previous`
    pub const fn follows(self, previous: Option<Self>) -> bool {
        matches!(
            (previous, self),
            (None, Self::Create)
                | (Some(Self::Create), Self::Load)
                | (Some(Self::Load | Self::Render), Self::Logic)
                | (Some(Self::Logic), Self::PreRender)
                | (Some(Self::PreRender), Self::Render)
        )
    }
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Load => "load",
            Self::Logic => "logic",
            Self::PreRender => "prerender",
            Self::Render => "render",
        };
        f.write_str(name)
    }
}

/// Last executed stage plus how often each stage ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTracker {
    last: Option<ProcessStage>,
    counts: [u64; 5],
}

impl StageTracker {
    /// Last stage executed, `None` before `Create`
    pub const fn last(&self) -> Option<ProcessStage> {
        self.last
    }

    /// Times `stage` has executed
    pub const fn count(&self, stage: ProcessStage) -> u64 {
        self.counts[stage.index()]
    }

    /// Whether `stage` may run next
    pub const fn can_enter(&self, stage: ProcessStage) -> bool {
        stage.follows(self.last)
    }

    /// Record that `stage` ran; illegal transitions are refused
    pub fn enter(&mut self, stage: ProcessStage) -> bool {
        if !self.can_enter(stage) {
            return false;
        }
        self.last = Some(stage);
        self.counts[stage.index()] += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_then_steady_state() {
        let mut tracker = StageTracker::default();
        for stage in ProcessStage::ALL {
            assert!(tracker.enter(stage), "{stage} should be legal");
        }
        for _ in 0..3 {
            assert!(tracker.enter(ProcessStage::Logic));
            assert!(tracker.enter(ProcessStage::PreRender));
            assert!(tracker.enter(ProcessStage::Render));
        }
        assert_eq!(tracker.count(ProcessStage::Create), 1);
        assert_eq!(tracker.count(ProcessStage::Load), 1);
        assert_eq!(tracker.count(ProcessStage::Logic), 4);
    }

    #[test]
    fn test_illegal_transitions_refused() {
        let mut tracker = StageTracker::default();
        assert!(!tracker.enter(ProcessStage::Load));
        assert!(tracker.enter(ProcessStage::Create));
        assert!(!tracker.enter(ProcessStage::Logic));
        assert!(!tracker.enter(ProcessStage::Create));
        assert_eq!(tracker.last(), Some(ProcessStage::Create));
        assert_eq!(tracker.count(ProcessStage::Logic), 0);
    }
}
