//! Pure wake-up planning, separated from the timer thread so it can be
//! tested without clocks or threads.
//!
//! Tasks are sorted by due time. The earliest task anchors the wake-up and
//! contributes its tolerance as a flexibility budget; each later task is
//! pulled into the same wake-up as long as the cumulative gap from the
//! anchor still fits the budget. The planned wake time is the due time of
//! the last task that fits, so the anchor task runs late (within its
//! tolerance) rather than waking the device twice.

/// Scheduling view of one registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTask {
    /// Scheduler-assigned identity.
    pub id: u64,
    /// Absolute due time, clock milliseconds.
    pub next_due: i64,
    pub interval: i64,
    pub tolerance: i64,
}

/// One planned wake-up: when to wake and which tasks to fire then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePlan {
    pub wake_at: i64,
    pub fire: Vec<u64>,
}

/// Plan the next wake-up for the given tasks, or `None` when there is
/// nothing to schedule.
pub fn plan_next(tasks: &[PlannedTask]) -> Option<WakePlan> {
    if tasks.is_empty() {
        return None;
    }

    let mut sorted: Vec<PlannedTask> = tasks.to_vec();
    sorted.sort_by_key(|t| t.next_due);

    let mut wake_at = sorted[0].next_due;
    let mut fire = vec![sorted[0].id];
    let mut remaining_flexibility = sorted[0].tolerance;
    for pair in sorted.windows(2) {
        remaining_flexibility -= pair[1].next_due - pair[0].next_due;
        if remaining_flexibility < 0 {
            break;
        }
        wake_at = pair[1].next_due;
        fire.push(pair[1].id);
    }

    Some(WakePlan { wake_at, fire })
}

/// Everything due at or before `now`. A wake-up that arrives late (the
/// process was suspended, the timer overslept) fires all missed tasks at
/// once instead of replaying each missed slot.
pub fn due_at(tasks: &[PlannedTask], now: i64) -> Vec<u64> {
    let mut due: Vec<PlannedTask> = tasks.iter().copied().filter(|t| t.next_due <= now).collect();
    due.sort_by_key(|t| t.next_due);
    due.into_iter().map(|t| t.id).collect()
}
