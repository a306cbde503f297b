//! Bulk donation review.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use common::{AccountId, DonationId};
use domain::{Donation, LedgerEffect};
use ledger::{BalanceEventType, LedgerError, LedgerStore};

use crate::error::{Result, SettlementError};
use crate::repos::{AccountDirectory, DonationRepository};

/// One staff decision in a bulk review.
#[derive(Debug, Clone, Copy)]
pub struct ReviewDecision {
    pub donation_id: DonationId,
    pub accepted: bool,
}

/// Result of a bulk review.
#[derive(Debug, Default)]
pub struct ReviewOutcome {
    /// Donations whose status changed (or was re-confirmed).
    pub updated: Vec<Donation>,

    /// Donations whose ledger effect could not be applied because the donor
    /// code was absent, unknown, ambiguous, or pointed at a missing account.
    /// Their status change still went through.
    pub unlinked: Vec<DonationId>,

    /// Decision ids that matched no donation.
    pub missing: Vec<DonationId>,
}

/// Applies staff review decisions to donations and the ledger.
pub struct DonationSettlement {
    ledger: Arc<dyn LedgerStore>,
    donations: Arc<dyn DonationRepository>,
    directory: Arc<dyn AccountDirectory>,
}

impl DonationSettlement {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        donations: Arc<dyn DonationRepository>,
        directory: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            ledger,
            donations,
            directory,
        }
    }

    /// Reviews a batch of donations.
    ///
    /// Each accepted/rejected decision drives the donation's transition
    /// table; when a transition carries a ledger effect, the credit or
    /// reversal is committed *before* the status write, so a donation can
    /// never read `Completed` without its credit. Donors that cannot be
    /// resolved are reported in `unlinked` rather than silently skipped.
    #[tracing::instrument(skip(self, decisions), fields(decisions = decisions.len()))]
    pub async fn review_donations(&self, decisions: &[ReviewDecision]) -> Result<ReviewOutcome> {
        let ids: Vec<DonationId> = decisions.iter().map(|d| d.donation_id).collect();
        let mut by_id: HashMap<DonationId, Donation> = self
            .donations
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|donation| (donation.id, donation))
            .collect();

        let now = Utc::now();
        let mut outcome = ReviewOutcome::default();

        for decision in decisions {
            // Duplicate decisions in one batch see the value the previous
            // decision produced, so each re-runs the transition table.
            let Some(donation) = by_id.get(&decision.donation_id).cloned() else {
                tracing::warn!(donation_id = %decision.donation_id, "decision for unknown donation");
                outcome.missing.push(decision.donation_id);
                continue;
            };

            let transition = donation.review(decision.accepted, now);

            if let Some(effect) = transition.effect {
                match self.resolve_donor(&transition.donation).await? {
                    Some(donor_id) => {
                        if !self
                            .apply_effect(donor_id, &transition.donation, effect)
                            .await?
                        {
                            outcome.unlinked.push(transition.donation.id);
                        }
                    }
                    None => outcome.unlinked.push(transition.donation.id),
                }
            }

            self.donations.update(&transition.donation).await?;
            by_id.insert(transition.donation.id, transition.donation.clone());
            outcome.updated.push(transition.donation);
        }

        metrics::counter!("donations_reviewed_total").increment(outcome.updated.len() as u64);
        if !outcome.unlinked.is_empty() {
            tracing::warn!(
                unlinked = outcome.unlinked.len(),
                "donations reviewed without a resolvable donor"
            );
        }
        Ok(outcome)
    }

    /// Resolves the donation's donor code to an account. Misses and
    /// ambiguities come back as `None`; infrastructure errors propagate.
    async fn resolve_donor(&self, donation: &Donation) -> Result<Option<AccountId>> {
        let Some(code) = donation.donator_code.as_deref() else {
            return Ok(None);
        };

        match self.directory.find_account_by_code(code).await {
            Ok(found) => Ok(found),
            Err(SettlementError::AmbiguousCode(code)) => {
                tracing::warn!(donation_id = %donation.id, code, "ambiguous donor code");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Applies the ledger effect. Returns `false` when the donor account no
    /// longer exists, which the caller reports as unlinked.
    async fn apply_effect(
        &self,
        donor_id: AccountId,
        donation: &Donation,
        effect: LedgerEffect,
    ) -> Result<bool> {
        let event_type = match effect {
            LedgerEffect::Grant => BalanceEventType::DonationGranted,
            LedgerEffect::Revoke => BalanceEventType::DonationRejected,
        };
        let delta = effect.signed_delta(donation.price_amount);

        match self.ledger.apply_delta(donor_id, delta, event_type).await {
            Ok(_) => Ok(true),
            Err(LedgerError::AccountNotFound(account_id)) => {
                tracing::warn!(donation_id = %donation.id, %account_id, "donor account missing");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
