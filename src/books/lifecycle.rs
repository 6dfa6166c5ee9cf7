//! Borrow/reserve/return rules for a single copy.
//!
//! Every function here is pure: it takes the current copy, the acting user,
//! the requested window and a single `now`, and either rejects the request
//! or returns the updated copy together with the side effects the caller has
//! to carry out. The input copy is never modified, so a rejected request
//! leaves nothing half-applied.

use serde_json::{json, Value};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    books::model::{BookCopy, BookDetails, Loan, LoanState, Reservation, Window},
    config::{LoanPolicy, MAX_RESERVATION_DAYS},
    error::AppError,
    users::model::{ActivityAction, ActivityEntry, ItemType},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
}

impl From<LifecycleError> for AppError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Validation(m) => AppError::Validation(m),
            LifecycleError::Forbidden(m) => AppError::Forbidden(m),
        }
    }
}

fn invalid<T>(msg: &str) -> Result<T, LifecycleError> {
    Err(LifecycleError::Validation(msg.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the history of `user`.
    Activity { user: Uuid, entry: ActivityEntry },
    /// Tell a reserver their booking is void and a refund is on its way.
    RefundNotice {
        user: Uuid,
        title: String,
        amount: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition<T = ()> {
    pub copy: BookCopy,
    pub effects: Vec<Effect>,
    pub outcome: T,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnReceipt {
    pub fine_amount: f64,
    pub overdue_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    Available,
    /// The pending reservation became the new loan of this user.
    Promoted(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossOutcome {
    MarkedLost,
    AlreadyLost,
}

fn activity(
    copy: &BookCopy,
    user: Uuid,
    action: ActivityAction,
    now: OffsetDateTime,
    metadata: Value,
) -> Effect {
    Effect::Activity {
        user,
        entry: ActivityEntry {
            action,
            item_type: ItemType::Book,
            item_id: copy.id,
            timestamp: now,
            metadata,
        },
    }
}

fn rfc3339(t: OffsetDateTime) -> Value {
    t.format(&time::format_description::well_known::Rfc3339)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Whole days past `due`, rounding any started day up.
pub fn overdue_days(due: OffsetDateTime, now: OffsetDateTime) -> i64 {
    if now <= due {
        return 0;
    }
    let day = Duration::DAY.whole_nanoseconds();
    let late = (now - due).whole_nanoseconds();
    ((late + day - 1) / day) as i64
}

pub fn borrow(
    copy: &BookCopy,
    user: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<Transition, LifecycleError> {
    let Some(window) = Window::new(start, end) else {
        return invalid("End time must be after start time");
    };
    if start <= now {
        return invalid("Start time must be in the future");
    }
    match (&copy.state, &copy.reservation) {
        (LoanState::Available, None) => {}
        // The holder picks up their own reservation.
        (LoanState::Available, Some(r)) if r.holder == user && start <= r.window.end() => {}
        _ => return invalid("Book is not currently available to borrow"),
    }

    let mut next = copy.clone();
    next.state = LoanState::Borrowed(Loan { borrower: user, window });
    next.reservation = None;
    next.renewed = false;

    let effects = vec![activity(
        &next,
        user,
        ActivityAction::Borrow,
        now,
        json!({
            "title": next.details.title,
            "startTime": rfc3339(start),
            "endTime": rfc3339(end),
        }),
    )];
    Ok(Transition { copy: next, effects, outcome: () })
}

pub fn reserve(
    copy: &BookCopy,
    user: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<Transition, LifecycleError> {
    let Some(window) = Window::new(start, end) else {
        return invalid("Reservation end must be after its start");
    };
    if end - start > Duration::days(MAX_RESERVATION_DAYS) {
        return Err(LifecycleError::Validation(format!(
            "Reservation cannot exceed {MAX_RESERVATION_DAYS} days"
        )));
    }
    if matches!(copy.state, LoanState::Lost { .. }) {
        return invalid("Book is lost and cannot be reserved");
    }
    if let Some(loan) = copy.state.loan() {
        if start < loan.window.end() {
            return invalid("Reservation must start after current borrow period");
        }
    }
    if let Some(existing) = &copy.reservation {
        if start <= existing.window.end() {
            return invalid("Book is already reserved during the selected time");
        }
    }

    let mut next = copy.clone();
    next.reservation = Some(Reservation { holder: user, window });

    let effects = vec![activity(
        &next,
        user,
        ActivityAction::Reserve,
        now,
        json!({
            "title": next.details.title,
            "reserveStartTime": rfc3339(start),
            "reserveEndTime": rfc3339(end),
        }),
    )];
    Ok(Transition { copy: next, effects, outcome: () })
}

pub fn request_return(
    copy: &BookCopy,
    user: Uuid,
    now: OffsetDateTime,
    policy: &LoanPolicy,
) -> Result<Transition<ReturnReceipt>, LifecycleError> {
    if copy.state.loan().map(|l| l.borrower) != Some(user) {
        return Err(LifecycleError::Forbidden("You did not borrow this book".into()));
    }
    let LoanState::Borrowed(loan) = copy.state else {
        return invalid("Book is not currently borrowed");
    };

    let overdue_days = overdue_days(loan.window.end(), now);
    let receipt = ReturnReceipt {
        fine_amount: overdue_days as f64 * policy.fine_per_day,
        overdue_days,
    };

    let mut next = copy.clone();
    next.state = LoanState::ReturnRequested(loan);
    Ok(Transition { copy: next, effects: Vec::new(), outcome: receipt })
}

pub fn approve_return(
    copy: &BookCopy,
    now: OffsetDateTime,
) -> Result<Transition<ReturnOutcome>, LifecycleError> {
    if !matches!(copy.state, LoanState::ReturnRequested(_)) {
        return invalid("Book is not in return request state");
    }

    let mut next = copy.clone();
    next.renewed = false;
    let Some(reservation) = next.reservation.take() else {
        next.state = LoanState::Available;
        return Ok(Transition {
            copy: next,
            effects: Vec::new(),
            outcome: ReturnOutcome::Available,
        });
    };

    next.state = LoanState::Borrowed(Loan {
        borrower: reservation.holder,
        window: reservation.window,
    });
    let effects = vec![activity(
        &next,
        reservation.holder,
        ActivityAction::Borrow,
        now,
        json!({ "title": next.details.title, "autoBorrowed": true }),
    )];
    Ok(Transition {
        copy: next,
        effects,
        outcome: ReturnOutcome::Promoted(reservation.holder),
    })
}

pub fn renew(
    copy: &BookCopy,
    user: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<Transition, LifecycleError> {
    if copy.state.loan().map(|l| l.borrower) != Some(user) {
        return Err(LifecycleError::Forbidden("You did not borrow this book".into()));
    }
    let LoanState::Borrowed(current) = copy.state else {
        return invalid("Only a book that is currently borrowed can be renewed");
    };
    let Some(window) = Window::new(start, end) else {
        return invalid("End time must be after start time");
    };
    if start <= now {
        return invalid("Start time must be in the future");
    }
    if start <= current.window.end() {
        return invalid("Start date must be after current end date.");
    }
    if let Some(r) = &copy.reservation {
        if r.holder != user && now <= r.window.end() {
            return invalid("Book is reserved and cannot be renewed");
        }
    }

    let mut next = copy.clone();
    next.state = LoanState::Borrowed(Loan { borrower: user, window });
    next.renewed = true;

    let effects = vec![activity(
        &next,
        user,
        ActivityAction::Renew,
        now,
        json!({
            "title": next.details.title,
            "newStartTime": rfc3339(start),
            "newEndTime": rfc3339(end),
        }),
    )];
    Ok(Transition { copy: next, effects, outcome: () })
}

/// Marks the copy lost. Marking an already lost copy changes nothing and
/// produces no effects.
pub fn mark_lost(
    copy: &BookCopy,
    now: OffsetDateTime,
    policy: &LoanPolicy,
) -> Transition<LossOutcome> {
    if matches!(copy.state, LoanState::Lost { .. }) {
        return Transition {
            copy: copy.clone(),
            effects: Vec::new(),
            outcome: LossOutcome::AlreadyLost,
        };
    }

    let mut next = copy.clone();
    let last_loan = copy.state.loan().copied();
    next.state = LoanState::Lost { last_loan };

    let mut effects = Vec::new();
    if let Some(loan) = last_loan {
        effects.push(activity(
            &next,
            loan.borrower,
            ActivityAction::Lost,
            now,
            json!({ "title": next.details.title }),
        ));
    }
    if let Some(reservation) = next.reservation.take() {
        let amount = if copy.details.cost > 0.0 {
            copy.details.cost
        } else {
            policy.default_refund
        };
        effects.push(Effect::RefundNotice {
            user: reservation.holder,
            title: copy.details.title.clone(),
            amount,
        });
    }
    Transition { copy: next, effects, outcome: LossOutcome::MarkedLost }
}

/// Administrative override taking a lost copy back into circulation.
pub fn restore(copy: &BookCopy) -> Result<Transition, LifecycleError> {
    if !matches!(copy.state, LoanState::Lost { .. }) {
        return invalid("Only lost copies can be restored");
    }
    let mut next = copy.clone();
    next.state = LoanState::Available;
    next.reservation = None;
    next.renewed = false;
    Ok(Transition { copy: next, effects: Vec::new(), outcome: () })
}

/// Drops a reservation that ran out before `now` on a copy nobody has on
/// loan. Returns `None` when there is nothing to clear.
pub fn expire(copy: &BookCopy, now: OffsetDateTime) -> Option<Transition<Reservation>> {
    let reservation = copy.reservation?;
    if !matches!(copy.state, LoanState::Available) || reservation.window.end() >= now {
        return None;
    }
    let mut next = copy.clone();
    next.reservation = None;
    Some(Transition { copy: next, effects: Vec::new(), outcome: reservation })
}

/// Copy id for a copy created when `existing` copies of `book_id` exist.
/// The first copy carries the bare book id.
pub fn copy_id_for(book_id: &str, existing: usize) -> String {
    if existing == 0 {
        book_id.to_string()
    } else {
        format!("{book_id}-{existing}")
    }
}

/// Derives a fresh, available copy of the same title as `original`.
pub fn add_copy(original: &BookCopy, existing: usize, location: Option<&str>) -> BookCopy {
    let details = BookDetails {
        location: location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| original.details.location.clone()),
        ..original.details.clone()
    };
    BookCopy::new(
        copy_id_for(&original.book_id, existing.max(1)),
        original.book_id.clone(),
        details,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::model::{fixtures, BookRecord, CopyStatus};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn policy() -> LoanPolicy {
        LoanPolicy::default()
    }

    fn mins(n: i64) -> Duration {
        Duration::minutes(n)
    }

    fn days(n: i64) -> Duration {
        Duration::days(n)
    }

    fn borrowed_by(user: Uuid) -> BookCopy {
        borrow(&fixtures::copy(), user, NOW + mins(1), NOW + days(7), NOW)
            .unwrap()
            .copy
    }

    fn assert_pairing(copy: &BookCopy) {
        let r = BookRecord::from(copy);
        assert_eq!(r.borrowed_by.is_some(), r.start_time.is_some());
        assert_eq!(r.borrowed_by.is_some(), r.end_time.is_some());
        assert_eq!(r.reserved_by.is_some(), r.reserve_start_time.is_some());
        assert_eq!(r.reserved_by.is_some(), r.reserve_end_time.is_some());
        assert_eq!(&BookCopy::try_from(r).unwrap(), copy);
    }

    #[test]
    fn borrow_sets_exact_window_and_logs() {
        let user = Uuid::new_v4();
        let (start, end) = (NOW + mins(1), NOW + days(7));
        let t = borrow(&fixtures::copy(), user, start, end, NOW).unwrap();

        assert_eq!(t.copy.status(), CopyStatus::Borrowed);
        let loan = t.copy.state.loan().unwrap();
        assert_eq!(loan.borrower, user);
        assert_eq!((loan.window.start(), loan.window.end()), (start, end));
        match &t.effects[..] {
            [Effect::Activity { user: u, entry }] => {
                assert_eq!(*u, user);
                assert_eq!(entry.action, ActivityAction::Borrow);
                assert_eq!(entry.item_id, t.copy.id);
            }
            other => panic!("unexpected effects {other:?}"),
        }
        assert_pairing(&t.copy);
    }

    #[test]
    fn borrow_rejects_bad_windows() {
        let c = fixtures::copy();
        let u = Uuid::new_v4();
        assert_eq!(
            borrow(&c, u, NOW + days(2), NOW + days(1), NOW).unwrap_err(),
            LifecycleError::Validation("End time must be after start time".into())
        );
        assert_eq!(
            borrow(&c, u, NOW, NOW + days(1), NOW).unwrap_err(),
            LifecycleError::Validation("Start time must be in the future".into())
        );
    }

    #[test]
    fn borrow_rejected_unless_available() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let borrowed = borrowed_by(a);
        let reserved = reserve(&fixtures::copy(), a, NOW + days(1), NOW + days(3), NOW)
            .unwrap()
            .copy;
        let lost = mark_lost(&fixtures::copy(), NOW, &policy()).copy;
        let returning = request_return(&borrowed, a, NOW, &policy()).unwrap().copy;

        for c in [borrowed, reserved, lost, returning] {
            let err = borrow(&c, b, NOW + mins(1), NOW + days(1), NOW).unwrap_err();
            assert_eq!(
                err,
                LifecycleError::Validation("Book is not currently available to borrow".into()),
                "status {:?}",
                c.status()
            );
        }
    }

    #[test]
    fn holder_borrows_own_reservation() {
        let (holder, other) = (Uuid::new_v4(), Uuid::new_v4());
        let reserved = reserve(&fixtures::copy(), holder, NOW + days(1), NOW + days(3), NOW)
            .unwrap()
            .copy;

        let err = borrow(&reserved, other, NOW + days(1), NOW + days(2), NOW).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Validation("Book is not currently available to borrow".into())
        );

        let t = borrow(&reserved, holder, NOW + days(1), NOW + days(2), NOW).unwrap();
        assert_eq!(t.copy.status(), CopyStatus::Borrowed);
        assert_eq!(t.copy.state.loan().unwrap().borrower, holder);
        assert!(t.copy.reservation.is_none());
        assert_pairing(&t.copy);
    }

    #[test]
    fn holder_cannot_borrow_after_reservation_ends() {
        let holder = Uuid::new_v4();
        let reserved = reserve(&fixtures::copy(), holder, NOW + days(1), NOW + days(3), NOW)
            .unwrap()
            .copy;
        let later = NOW + days(4);
        assert!(borrow(&reserved, holder, later + mins(1), later + days(1), later).is_err());
    }

    #[test]
    fn expire_clears_lapsed_reservation_on_idle_copy() {
        let holder = Uuid::new_v4();
        let reserved = reserve(&fixtures::copy(), holder, NOW + days(1), NOW + days(3), NOW)
            .unwrap()
            .copy;
        assert!(expire(&reserved, NOW + days(2)).is_none());
        assert!(expire(&reserved, NOW + days(3)).is_none());

        let t = expire(&reserved, NOW + days(30)).unwrap();
        assert_eq!(t.outcome.holder, holder);
        assert_eq!(t.copy.status(), CopyStatus::Available);
        assert!(t.effects.is_empty());
        assert_pairing(&t.copy);

        let later = NOW + days(30);
        let again = borrow(&t.copy, Uuid::new_v4(), later + mins(1), later + days(1), later);
        assert!(again.is_ok());
    }

    #[test]
    fn expire_leaves_loans_and_plain_copies_alone() {
        assert!(expire(&fixtures::copy(), NOW + days(30)).is_none());

        let c = borrowed_by(Uuid::new_v4());
        let end = c.state.loan().unwrap().window.end();
        let c = reserve(&c, Uuid::new_v4(), end + days(1), end + days(2), NOW)
            .unwrap()
            .copy;
        assert!(expire(&c, end + days(30)).is_none());
    }

    #[test]
    fn reserve_caps_span() {
        let c = fixtures::copy();
        let u = Uuid::new_v4();
        let start = NOW + days(1);
        assert!(reserve(&c, u, start, start + days(28), NOW).is_ok());
        let err = reserve(&c, u, start, start + days(28) + mins(1), NOW).unwrap_err();
        assert_eq!(err, LifecycleError::Validation("Reservation cannot exceed 28 days".into()));
    }

    #[test]
    fn reserve_available_copy_shows_reserved() {
        let u = Uuid::new_v4();
        let t = reserve(&fixtures::copy(), u, NOW + days(1), NOW + days(5), NOW).unwrap();
        assert_eq!(t.copy.status(), CopyStatus::Reserved);
        assert_eq!(t.copy.reservation.unwrap().holder, u);
        assert!(matches!(
            &t.effects[..],
            [Effect::Activity { entry, .. }] if entry.action == ActivityAction::Reserve
        ));
        assert_pairing(&t.copy);
    }

    #[test]
    fn reserve_borrowed_copy_must_start_after_loan() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();

        assert!(reserve(&c, b, end - mins(1), end + days(3), NOW).is_err());
        let t = reserve(&c, b, end, end + days(3), NOW).unwrap();
        assert_eq!(t.copy.status(), CopyStatus::Borrowed);
        assert_eq!(t.copy.reservation.unwrap().holder, b);
        assert_pairing(&t.copy);
    }

    #[test]
    fn reserve_never_overwrites_existing_reservation() {
        let b = Uuid::new_v4();
        let c = reserve(&fixtures::copy(), b, NOW + days(1), NOW + days(5), NOW)
            .unwrap()
            .copy;
        let err = reserve(&c, Uuid::new_v4(), NOW + days(5), NOW + days(8), NOW).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Validation("Book is already reserved during the selected time".into())
        );
        let t = reserve(&c, Uuid::new_v4(), NOW + days(6), NOW + days(8), NOW).unwrap();
        assert_ne!(t.copy.reservation.unwrap().holder, b);
    }

    #[test]
    fn reserve_lost_copy_rejected() {
        let lost = mark_lost(&fixtures::copy(), NOW, &policy()).copy;
        let u = Uuid::new_v4();
        assert!(reserve(&lost, u, NOW + days(1), NOW + days(2), NOW).is_err());
    }

    #[test]
    fn request_return_only_by_borrower() {
        let a = Uuid::new_v4();
        let c = borrowed_by(a);
        assert_eq!(
            request_return(&c, Uuid::new_v4(), NOW, &policy()).unwrap_err(),
            LifecycleError::Forbidden("You did not borrow this book".into())
        );
        let pending = request_return(&c, a, NOW, &policy()).unwrap().copy;
        assert_eq!(
            request_return(&pending, a, NOW, &policy()).unwrap_err(),
            LifecycleError::Validation("Book is not currently borrowed".into())
        );
    }

    #[test]
    fn request_return_on_time_has_no_fine() {
        let a = Uuid::new_v4();
        let t = request_return(&borrowed_by(a), a, NOW + days(2), &policy()).unwrap();
        assert_eq!(t.outcome, ReturnReceipt { fine_amount: 0.0, overdue_days: 0 });
        assert_eq!(t.copy.status(), CopyStatus::ReturnRequested);
        assert_eq!(t.copy.state.loan().unwrap().borrower, a);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn overdue_rounds_partial_days_up() {
        let due = NOW;
        assert_eq!(overdue_days(due, due), 0);
        assert_eq!(overdue_days(due, due - days(1)), 0);
        assert_eq!(overdue_days(due, due + Duration::seconds(1)), 1);
        assert_eq!(overdue_days(due, due + days(3)), 3);
        assert_eq!(overdue_days(due, due + days(3) + mins(1)), 4);
    }

    #[test]
    fn late_return_then_approval_frees_the_copy() {
        let a = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();

        let t = request_return(&c, a, end + days(3), &policy()).unwrap();
        assert_eq!(t.outcome.overdue_days, 3);
        assert_eq!(t.outcome.fine_amount, 3.0 * policy().fine_per_day);
        assert_eq!(t.copy.status(), CopyStatus::ReturnRequested);

        let done = approve_return(&t.copy, end + days(3)).unwrap();
        assert_eq!(done.outcome, ReturnOutcome::Available);
        assert_eq!(done.copy.status(), CopyStatus::Available);
        assert!(done.copy.state.loan().is_none());
        assert!(done.effects.is_empty());
        assert_pairing(&done.copy);
    }

    #[test]
    fn approval_promotes_pending_reservation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();
        let c = reserve(&c, b, end + days(1), end + days(8), NOW).unwrap().copy;
        let c = request_return(&c, a, NOW + days(1), &policy()).unwrap().copy;

        let t = approve_return(&c, NOW + days(1)).unwrap();
        assert_eq!(t.outcome, ReturnOutcome::Promoted(b));
        assert_eq!(t.copy.status(), CopyStatus::Borrowed);
        let loan = t.copy.state.loan().unwrap();
        assert_eq!(loan.borrower, b);
        assert_eq!(loan.window.start(), end + days(1));
        assert_eq!(loan.window.end(), end + days(8));
        assert!(t.copy.reservation.is_none());
        match &t.effects[..] {
            [Effect::Activity { user, entry }] => {
                assert_eq!(*user, b);
                assert_eq!(entry.action, ActivityAction::Borrow);
                assert_eq!(entry.metadata["autoBorrowed"], true);
            }
            other => panic!("unexpected effects {other:?}"),
        }
        assert_pairing(&t.copy);
    }

    #[test]
    fn approval_requires_pending_return() {
        let c = borrowed_by(Uuid::new_v4());
        assert!(approve_return(&c, NOW).is_err());
        assert!(approve_return(&fixtures::copy(), NOW).is_err());
    }

    #[test]
    fn renew_extends_after_current_end() {
        let a = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();

        let t = renew(&c, a, end + mins(1), end + days(7), NOW).unwrap();
        assert!(t.copy.renewed);
        assert_eq!(t.copy.state.loan().unwrap().window.end(), end + days(7));
        assert!(matches!(
            &t.effects[..],
            [Effect::Activity { entry, .. }] if entry.action == ActivityAction::Renew
        ));
        assert_pairing(&t.copy);
    }

    #[test]
    fn renew_rejects_overlap_or_shrink() {
        let a = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();
        for start in [end, end - days(1)] {
            assert_eq!(
                renew(&c, a, start, end + days(7), NOW).unwrap_err(),
                LifecycleError::Validation("Start date must be after current end date.".into())
            );
        }
    }

    #[test]
    fn renew_rejects_non_borrower_and_past_start() {
        let a = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();
        assert!(matches!(
            renew(&c, Uuid::new_v4(), end + mins(1), end + days(2), NOW),
            Err(LifecycleError::Forbidden(_))
        ));
        assert!(renew(&c, a, end + mins(1), end + days(2), end + days(1)).is_err());
    }

    #[test]
    fn reservation_by_someone_else_blocks_renewal() {
        let a = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();
        let c = reserve(&c, Uuid::new_v4(), end + days(1), end + days(4), NOW)
            .unwrap()
            .copy;
        assert_eq!(
            renew(&c, a, end + mins(1), end + days(7), NOW).unwrap_err(),
            LifecycleError::Validation("Book is reserved and cannot be renewed".into())
        );

        let own = reserve(&borrowed_by(a), a, end + days(1), end + days(4), NOW)
            .unwrap()
            .copy;
        assert!(renew(&own, a, end + mins(1), end + days(7), NOW).is_ok());
    }

    #[test]
    fn mark_lost_refunds_reserver_and_logs_against_borrower() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = borrowed_by(a);
        let end = c.state.loan().unwrap().window.end();
        let c = reserve(&c, b, end + days(1), end + days(4), NOW).unwrap().copy;

        let t = mark_lost(&c, NOW, &policy());
        assert_eq!(t.outcome, LossOutcome::MarkedLost);
        assert_eq!(t.copy.status(), CopyStatus::Lost);
        assert!(t.copy.reservation.is_none());
        assert_eq!(t.copy.state.loan().unwrap().borrower, a);
        assert!(matches!(
            &t.effects[0],
            Effect::Activity { user, entry } if *user == a && entry.action == ActivityAction::Lost
        ));
        assert_eq!(
            t.effects[1],
            Effect::RefundNotice {
                user: b,
                title: c.details.title.clone(),
                amount: c.details.cost,
            }
        );
        assert_pairing(&t.copy);
    }

    #[test]
    fn mark_lost_uses_default_refund_without_cost() {
        let mut c = fixtures::copy();
        c.details.cost = 0.0;
        let c = reserve(&c, Uuid::new_v4(), NOW + days(1), NOW + days(2), NOW)
            .unwrap()
            .copy;
        let t = mark_lost(&c, NOW, &policy());
        assert!(matches!(
            t.effects[..],
            [Effect::RefundNotice { amount, .. }] if amount == policy().default_refund
        ));
    }

    #[test]
    fn mark_lost_twice_notifies_once() {
        let u = Uuid::new_v4();
        let c = reserve(&fixtures::copy(), u, NOW + days(1), NOW + days(2), NOW)
            .unwrap()
            .copy;
        let first = mark_lost(&c, NOW, &policy());
        assert_eq!(first.effects.len(), 1);

        let second = mark_lost(&first.copy, NOW, &policy());
        assert_eq!(second.outcome, LossOutcome::AlreadyLost);
        assert_eq!(second.copy.status(), CopyStatus::Lost);
        assert!(second.effects.is_empty());
    }

    #[test]
    fn restore_only_from_lost() {
        assert!(restore(&fixtures::copy()).is_err());
        let lost = mark_lost(&borrowed_by(Uuid::new_v4()), NOW, &policy()).copy;
        let t = restore(&lost).unwrap();
        assert_eq!(t.copy.status(), CopyStatus::Available);
        assert_pairing(&t.copy);
    }

    #[test]
    fn add_copy_suffixes_count_and_overrides_location() {
        let original = borrowed_by(Uuid::new_v4());
        let c = add_copy(&original, 2, Some("Annex B"));
        assert_eq!(c.copy_id, "LHD-2");
        assert_eq!(c.book_id, original.book_id);
        assert_eq!(c.details.location, "Annex B");
        assert_eq!(c.details.title, original.details.title);
        assert_eq!(c.status(), CopyStatus::Available);
        assert_ne!(c.id, original.id);

        let same_shelf = add_copy(&original, 3, Some("  "));
        assert_eq!(same_shelf.details.location, original.details.location);
    }

    #[test]
    fn first_copy_keeps_bare_book_id() {
        assert_eq!(copy_id_for("B7", 0), "B7");
        assert_eq!(copy_id_for("B7", 1), "B7-1");
    }

    #[test]
    fn pairing_holds_across_a_long_sequence() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let p = policy();
        let mut copy = fixtures::copy();
        let mut now = NOW;

        copy = borrow(&copy, a, now + mins(1), now + days(7), now).unwrap().copy;
        assert_pairing(&copy);
        let end = copy.state.loan().unwrap().window.end();
        copy = renew(&copy, a, end + mins(1), end + days(7), now).unwrap().copy;
        assert_pairing(&copy);
        let end = copy.state.loan().unwrap().window.end();
        copy = reserve(&copy, b, end, end + days(10), now).unwrap().copy;
        assert_pairing(&copy);
        now = end + days(2);
        copy = request_return(&copy, a, now, &p).unwrap().copy;
        assert_pairing(&copy);
        copy = approve_return(&copy, now).unwrap().copy;
        assert_pairing(&copy);
        assert_eq!(copy.state.loan().unwrap().borrower, b);
        let end = copy.state.loan().unwrap().window.end();
        copy = reserve(&copy, c, end + days(1), end + days(3), now).unwrap().copy;
        assert_pairing(&copy);
        copy = mark_lost(&copy, now, &p).copy;
        assert_pairing(&copy);
        copy = restore(&copy).unwrap().copy;
        assert_pairing(&copy);
        assert_eq!(copy.status(), CopyStatus::Available);
    }
}
