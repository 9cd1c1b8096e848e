//! Optimistic-command pattern for toggle-like interactions: apply a local
//! delta immediately, issue the idempotent server command, then either
//! reconcile with the authoritative response or roll back on failure. The
//! server is always the source of truth; the staged value is a display
//! guess, never an input to the next command.

use cl_api_types::BookmarkToggleResponse;

/// Client-held state that knows how to apply a local delta.
pub trait OptimisticState: Clone {
    type Delta;

    fn apply(&mut self, delta: &Self::Delta);
}

/// Committed value plus an optional staged guess. Rapid repeated stages
/// stack onto the guess; the first reconcile or rollback resolves them
/// all at once.
#[derive(Debug, Clone)]
pub struct OptimisticCell<S: OptimisticState> {
    committed: S,
    staged: Option<S>,
}

impl<S: OptimisticState> OptimisticCell<S> {
    pub fn new(committed: S) -> Self {
        Self {
            committed,
            staged: None,
        }
    }

    /// What the UI should show right now.
    pub fn view(&self) -> &S {
        self.staged.as_ref().unwrap_or(&self.committed)
    }

    pub fn is_dirty(&self) -> bool {
        self.staged.is_some()
    }

    /// Apply `delta` to the visible value before the command resolves.
    pub fn stage(&mut self, delta: &S::Delta) {
        let mut next = self.view().clone();
        next.apply(delta);
        self.staged = Some(next);
    }

    /// Overwrite with the server's authoritative value, discarding any
    /// optimistic drift.
    pub fn reconcile(&mut self, authoritative: S) {
        self.committed = authoritative;
        self.staged = None;
    }

    /// Command failed: drop the guess and fall back to the last
    /// committed value.
    pub fn rollback(&mut self) {
        self.staged = None;
    }
}

/// Client-side model of a favorite button: flip state, adjust count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkView {
    pub is_bookmarked: bool,
    pub count: u64,
}

/// The only delta a bookmark supports is a flip.
#[derive(Debug, Clone, Copy)]
pub struct Flip;

impl OptimisticState for BookmarkView {
    type Delta = Flip;

    fn apply(&mut self, _delta: &Flip) {
        if self.is_bookmarked {
            self.is_bookmarked = false;
            self.count = self.count.saturating_sub(1);
        } else {
            self.is_bookmarked = true;
            self.count = self.count.saturating_add(1);
        }
    }
}

impl From<&BookmarkToggleResponse> for BookmarkView {
    fn from(response: &BookmarkToggleResponse) -> Self {
        Self {
            is_bookmarked: response.is_bookmarked,
            count: response.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_api_types::EventId;

    fn cell(is_bookmarked: bool, count: u64) -> OptimisticCell<BookmarkView> {
        OptimisticCell::new(BookmarkView {
            is_bookmarked,
            count,
        })
    }

    fn response(is_bookmarked: bool, count: u64) -> BookmarkToggleResponse {
        BookmarkToggleResponse {
            event_id: EventId("ev-1".to_owned()),
            is_bookmarked,
            count,
        }
    }

    #[test]
    fn stage_flips_immediately() {
        let mut cell = cell(false, 3);
        cell.stage(&Flip);

        assert!(cell.is_dirty());
        assert!(cell.view().is_bookmarked);
        assert_eq!(cell.view().count, 4);
    }

    #[test]
    fn reconcile_overwrites_optimistic_drift() {
        let mut cell = cell(false, 3);
        cell.stage(&Flip);

        // another session favorited meanwhile: server count is 5, not 4
        cell.reconcile(BookmarkView::from(&response(true, 5)));

        assert!(!cell.is_dirty());
        assert!(cell.view().is_bookmarked);
        assert_eq!(cell.view().count, 5);
    }

    #[test]
    fn rollback_restores_pre_optimistic_value() {
        let mut cell = cell(true, 7);
        cell.stage(&Flip);
        assert_eq!(cell.view().count, 6);

        cell.rollback();

        assert!(!cell.is_dirty());
        assert!(cell.view().is_bookmarked);
        assert_eq!(cell.view().count, 7);
    }

    #[test]
    fn double_click_race_converges_on_server_truth() {
        let mut cell = cell(false, 3);

        // two rapid clicks before the first response lands
        cell.stage(&Flip);
        cell.stage(&Flip);
        assert!(!cell.view().is_bookmarked);
        assert_eq!(cell.view().count, 3);

        // the server saw two toggles too and reports the final state
        cell.reconcile(BookmarkView::from(&response(false, 3)));
        assert_eq!(
            *cell.view(),
            BookmarkView {
                is_bookmarked: false,
                count: 3
            }
        );
    }

    #[test]
    fn count_never_underflows() {
        let mut cell = cell(true, 0);
        cell.stage(&Flip);
        assert_eq!(cell.view().count, 0);
    }
}
