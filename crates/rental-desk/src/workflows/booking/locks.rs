use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use super::domain::BookingId;
use super::engine::{Deadline, WorkflowError};

/// Table of booking ids with a transition in flight.
///
/// `acquire` blocks while another caller holds the same id, up to the caller's deadline;
/// different ids never contend beyond the short critical section on the set itself.
#[derive(Debug, Default)]
pub(crate) struct BookingLocks {
    in_flight: Mutex<HashSet<BookingId>>,
    released: Condvar,
}

impl BookingLocks {
    pub(crate) fn acquire(
        &self,
        id: &BookingId,
        deadline: &Deadline,
    ) -> Result<BookingLockGuard<'_>, WorkflowError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while in_flight.contains(id) {
            deadline.check("lock")?;
            in_flight = match deadline.wait_slice() {
                Some(slice) => {
                    self.released
                        .wait_timeout(in_flight, slice)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .released
                    .wait(in_flight)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        in_flight.insert(id.clone());

        Ok(BookingLockGuard {
            locks: self,
            id: id.clone(),
        })
    }

    #[cfg(test)]
    fn is_held(&self, id: &BookingId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

pub(crate) struct BookingLockGuard<'a> {
    locks: &'a BookingLocks,
    id: BookingId,
}

impl Drop for BookingLockGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .locks
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(&self.id);
        self.locks.released.notify_all();
    }
}
