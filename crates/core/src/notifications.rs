use chrono::{DateTime, Utc};

use crate::domain::actor::Role;
use crate::domain::notification::{Notification, Recipient};
use crate::domain::request::{Request, Stage};

/// Turns workflow events into user-facing notifications. Pure: persistence is
/// the caller's job so the notification can commit with the transition.
#[derive(Clone, Debug)]
pub struct NotificationRelay {
    reviewers: Role,
}

impl Default for NotificationRelay {
    fn default() -> Self {
        Self { reviewers: Role::BudgetAnalyst }
    }
}

impl NotificationRelay {
    pub fn on_submitted(&self, request: &Request, at: DateTime<Utc>) -> Notification {
        Notification::new(
            Recipient::Role(self.reviewers),
            format!(
                "A new restocking request ({}) was submitted by {}. Please review the requisition voucher.",
                request.reference, request.requester.name
            ),
            Some(request.id.clone()),
            at,
        )
    }

    /// Exactly one notification per legal transition; `None` for any other pair.
    pub fn on_transition(
        &self,
        request: &Request,
        from: Stage,
        to: Stage,
        at: DateTime<Utc>,
    ) -> Option<Notification> {
        let requester = || Recipient::Actor(request.requester.id.clone());
        let (recipient, message) = match (from, to) {
            (Stage::Submitted, Stage::Approved) => (
                requester(),
                format!(
                    "Your restocking request {} has been approved. Please wait for PO creation.",
                    request.reference
                ),
            ),
            (Stage::Submitted, Stage::Rejected) => (
                requester(),
                format!("Your restocking request {} has been rejected.", request.reference),
            ),
            (Stage::Approved, Stage::Drafted) => (
                Recipient::Role(self.reviewers),
                format!(
                    "Purchase order {} for request {} is ready to finalize.",
                    request.draft.as_ref().map(|draft| draft.po_number.as_str()).unwrap_or("-"),
                    request.reference
                ),
            ),
            (Stage::Drafted, Stage::Finalized) => (
                requester(),
                format!(
                    "The purchase order for your restocking request {} has been finalized.",
                    request.reference
                ),
            ),
            _ => return None,
        };

        Some(Notification::new(recipient, message, Some(request.id.clone()), at))
    }
}
