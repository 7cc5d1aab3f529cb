/// Progress shown as soon as a job is seen generating.
pub const PROGRESS_FLOOR: u8 = 15;
/// Highest value the poll-count heuristic can reach.
pub const PROGRESS_CEILING: u8 = 85;
/// Reserved for an observed completion.
pub const PROGRESS_DONE: u8 = 100;

const PROGRESS_STEP: u32 = 2;

/// Synthetic progress for a generating job after `poll_count` polls.
///
/// This is a UI heuristic, not a measurement: the backend reports no
/// percentage, so the estimate grows with elapsed polls and stops short of
/// completion until the job is actually seen completed.
pub fn estimate_progress(poll_count: u32) -> u8 {
    let estimate = u32::from(PROGRESS_FLOOR).saturating_add(poll_count.saturating_mul(PROGRESS_STEP));
    estimate.min(u32::from(PROGRESS_CEILING)) as u8
}

/// Tracks how much of a job's append-only log has already been emitted.
///
/// The position is recomputed from the fetched length on every call, so a
/// fresh cursor against a log with N entries yields all N once and nothing on
/// later calls with the same log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogCursor {
    position: usize,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the unseen suffix of `logs` and moves the cursor to its end.
    ///
    /// A log shorter than the cursor (the backend started a new attempt)
    /// yields nothing and rewinds the cursor to the new length.
    pub fn advance<'a>(&mut self, logs: &'a [String]) -> &'a [String] {
        if logs.len() <= self.position {
            self.position = logs.len();
            return &[];
        }
        let fresh = &logs[self.position..];
        self.position = logs.len();
        fresh
    }
}
