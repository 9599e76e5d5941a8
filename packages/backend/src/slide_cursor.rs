// packages/backend/src/slide_cursor.rs
use crate::error::SurveyError;
use crate::types::{SlideIndex, NOT_STARTED};
use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideState {
    NotStarted,
    Active(SlideIndex),
    Finished,
}

/// Global slide position shared by every request and subscriber.
///
/// Lock-free: readers load the current value, `advance` is a CAS loop so that
/// concurrent presenters each get a distinct successor and the value saturates
/// at the slide count.
#[derive(Debug)]
pub struct SlideCursor {
    current: AtomicI32,
    slide_count: AtomicI32,
}

impl SlideCursor {
    pub fn new(slide_count: SlideIndex) -> Self {
        Self {
            current: AtomicI32::new(NOT_STARTED),
            slide_count: AtomicI32::new(slide_count),
        }
    }

    pub fn current(&self) -> SlideIndex {
        self.current.load(Ordering::Acquire)
    }

    pub fn slide_count(&self) -> SlideIndex {
        self.slide_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SlideState {
        let current = self.current();
        if current < 0 {
            SlideState::NotStarted
        } else if current >= self.slide_count() {
            SlideState::Finished
        } else {
            SlideState::Active(current)
        }
    }

    /// Moves to the next slide. Once the cursor reaches the slide count it stays there.
    pub fn advance(&self) -> Result<SlideIndex, SurveyError> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.slide_count()).then_some(current + 1)
            })
            .map(|previous| previous + 1)
            .map_err(|_| SurveyError::AlreadyFinished)
    }

    /// Back to "not started", optionally for a survey of a different length.
    pub fn reset(&self, slide_count: SlideIndex) {
        self.slide_count.store(slide_count, Ordering::Release);
        self.current.store(NOT_STARTED, Ordering::Release);
    }
}
