//! In-memory reservation ledger.
//!
//! Every transition takes the single state lock, checks the current state and
//! writes the new one before releasing it. No lock is held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::catalog::{SchemeCatalog, SchemeId};
use crate::checkout::Order;
use crate::metrics::{ACTIVE_CLAIMS, CLAIMS_RELEASED, CLAIM_ATTEMPTS};
use crate::profile::{validate_profile, BuyerProfile};

use super::types::{Claim, ClaimState, LedgerError, ReleaseReason, TicketKey};

#[derive(Default)]
struct LedgerState {
    claims: HashMap<String, Claim>,
    by_key: HashMap<TicketKey, String>,
    by_order: HashMap<String, String>,
    sold: HashSet<TicketKey>,
}

impl LedgerState {
    fn claim_mut(&mut self, claim_id: &str) -> Result<&mut Claim, LedgerError> {
        self.claims
            .get_mut(claim_id)
            .ok_or_else(|| LedgerError::ClaimNotFound(claim_id.to_string()))
    }

    /// Drop a claim and its indexes, returning it.
    fn remove(&mut self, claim_id: &str) -> Option<Claim> {
        let claim = self.claims.remove(claim_id)?;
        self.by_key.remove(&claim.key);
        if let Some(order_id) = claim.gateway_order_id() {
            self.by_order.remove(order_id);
        }
        ACTIVE_CLAIMS.set(self.claims.len() as i64);
        Some(claim)
    }
}

/// Record of claimed and sold ticket numbers.
pub struct ReservationLedger {
    catalog: Arc<SchemeCatalog>,
    ttl: Duration,
    state: Mutex<LedgerState>,
}

impl ReservationLedger {
    pub fn new(catalog: Arc<SchemeCatalog>, ttl: Duration) -> Self {
        Self {
            catalog,
            ttl,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Mark numbers that already have a persisted ticket as sold.
    pub fn seed_sold(&self, keys: impl IntoIterator<Item = TicketKey>) {
        let mut state = self.lock();
        let before = state.sold.len();
        state.sold.extend(keys);
        info!("Ledger seeded with {} sold tickets", state.sold.len() - before);
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim an unsold number for a buyer.
    pub fn try_claim(
        &self,
        scheme_id: SchemeId,
        ticket_number: u32,
        buyer: BuyerProfile,
    ) -> Result<Claim, LedgerError> {
        self.try_claim_at(scheme_id, ticket_number, buyer, Utc::now())
    }

    pub(crate) fn try_claim_at(
        &self,
        scheme_id: SchemeId,
        ticket_number: u32,
        buyer: BuyerProfile,
        now: DateTime<Utc>,
    ) -> Result<Claim, LedgerError> {
        let result = self.insert_claim(scheme_id, ticket_number, buyer, now);
        let label = match &result {
            Ok(_) => "granted",
            Err(LedgerError::AlreadyClaimed(_)) => "already_claimed",
            Err(LedgerError::AlreadySold(_)) => "already_sold",
            Err(_) => "invalid",
        };
        CLAIM_ATTEMPTS.with_label_values(&[label]).inc();
        result
    }

    fn insert_claim(
        &self,
        scheme_id: SchemeId,
        ticket_number: u32,
        buyer: BuyerProfile,
        now: DateTime<Utc>,
    ) -> Result<Claim, LedgerError> {
        self.catalog.check_number(scheme_id, ticket_number)?;
        validate_profile(&buyer)?;

        let key = TicketKey::new(scheme_id, ticket_number);
        let mut state = self.lock();

        if state.sold.contains(&key) {
            return Err(LedgerError::AlreadySold(key));
        }

        if let Some(existing_id) = state.by_key.get(&key).cloned() {
            let reclaimable = state
                .claims
                .get(&existing_id)
                .is_some_and(|c| c.state != ClaimState::Verifying && c.is_expired_at(now));
            if !reclaimable {
                return Err(LedgerError::AlreadyClaimed(key));
            }
            // Expired hold the sweep has not reached yet.
            if let Some(stale) = state.remove(&existing_id) {
                CLAIMS_RELEASED
                    .with_label_values(&[ReleaseReason::Expired.as_str()])
                    .inc();
                debug!("Evicted expired claim {} on {}", stale.id, key);
            }
        }

        let claim = Claim {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            buyer,
            state: ClaimState::Claimed,
            created_at: now,
            expires_at: now + self.ttl,
            order: None,
        };

        state.by_key.insert(key, claim.id.clone());
        state.claims.insert(claim.id.clone(), claim.clone());
        ACTIVE_CLAIMS.set(state.claims.len() as i64);

        debug!("Claim {} granted on {}", claim.id, key);
        Ok(claim)
    }

    /// Current snapshot of a live claim.
    pub fn get(&self, claim_id: &str) -> Option<Claim> {
        self.lock().claims.get(claim_id).cloned()
    }

    /// Live claim that owns a gateway order.
    pub fn claim_for_order(&self, gateway_order_id: &str) -> Option<Claim> {
        let state = self.lock();
        state
            .by_order
            .get(gateway_order_id)
            .and_then(|id| state.claims.get(id))
            .cloned()
    }

    pub fn is_sold(&self, key: &TicketKey) -> bool {
        self.lock().sold.contains(key)
    }

    pub fn active_claims(&self) -> usize {
        self.lock().claims.len()
    }

    /// `Claimed -> OrderCreated`.
    pub fn attach_order(&self, claim_id: &str, order: Order) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let claim = state.claim_mut(claim_id)?;
        if claim.state != ClaimState::Claimed {
            return Err(LedgerError::InvalidTransition {
                claim_id: claim_id.to_string(),
                current: claim.state,
                operation: "attach order to",
            });
        }

        let gateway_order_id = order.gateway_order_id.clone();
        claim.state = ClaimState::OrderCreated;
        claim.order = Some(order);
        let snapshot = claim.clone();
        state.by_order.insert(gateway_order_id, claim_id.to_string());
        Ok(snapshot)
    }

    /// `OrderCreated -> AwaitingGateway`. Repeating the call is harmless.
    pub fn mark_gateway_open(&self, claim_id: &str) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let claim = state.claim_mut(claim_id)?;
        match claim.state {
            ClaimState::OrderCreated => {
                claim.state = ClaimState::AwaitingGateway;
                Ok(claim.clone())
            }
            ClaimState::AwaitingGateway => Ok(claim.clone()),
            current => Err(LedgerError::InvalidTransition {
                claim_id: claim_id.to_string(),
                current,
                operation: "open gateway for",
            }),
        }
    }

    /// `OrderCreated | AwaitingGateway -> Verifying`.
    ///
    /// Once a claim is verifying the expiry sweep leaves it alone, so a finalize
    /// that started before the sweep always wins.
    pub fn begin_verification(&self, claim_id: &str) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let claim = state.claim_mut(claim_id)?;
        match claim.state {
            ClaimState::OrderCreated | ClaimState::AwaitingGateway => {
                claim.state = ClaimState::Verifying;
                Ok(claim.clone())
            }
            current => Err(LedgerError::InvalidTransition {
                claim_id: claim_id.to_string(),
                current,
                operation: "verify",
            }),
        }
    }

    /// Consume a verifying claim and mark its number sold.
    pub fn finalize(&self, claim_id: &str) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let claim = state.claim_mut(claim_id)?;
        if claim.state != ClaimState::Verifying {
            return Err(LedgerError::InvalidTransition {
                claim_id: claim_id.to_string(),
                current: claim.state,
                operation: "finalize",
            });
        }
        let key = claim.key;

        if state.sold.contains(&key) {
            warn!("Claim {} finalizing on {} which is already sold", claim_id, key);
            return Err(LedgerError::AlreadySold(key));
        }

        let mut claim = state
            .remove(claim_id)
            .ok_or_else(|| LedgerError::ClaimNotFound(claim_id.to_string()))?;
        state.sold.insert(key);
        claim.state = ClaimState::Finalized;

        info!("Ticket {} sold via claim {}", key, claim_id);
        Ok(claim)
    }

    /// Release a claim that has not started verification.
    pub fn release(&self, claim_id: &str, reason: ReleaseReason) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let current = state.claim_mut(claim_id)?.state;
        if current == ClaimState::Verifying {
            return Err(LedgerError::InvalidTransition {
                claim_id: claim_id.to_string(),
                current,
                operation: "release",
            });
        }
        Self::drop_claim(&mut state, claim_id, reason)
    }

    /// Terminate a verifying claim whose payment failed verification.
    pub fn reject(&self, claim_id: &str, reason: ReleaseReason) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let current = state.claim_mut(claim_id)?.state;
        if current != ClaimState::Verifying {
            return Err(LedgerError::InvalidTransition {
                claim_id: claim_id.to_string(),
                current,
                operation: "reject",
            });
        }
        Self::drop_claim(&mut state, claim_id, reason)
    }

    fn drop_claim(
        state: &mut LedgerState,
        claim_id: &str,
        reason: ReleaseReason,
    ) -> Result<Claim, LedgerError> {
        let mut claim = state
            .remove(claim_id)
            .ok_or_else(|| LedgerError::ClaimNotFound(claim_id.to_string()))?;
        claim.state = reason.terminal_state();
        CLAIMS_RELEASED.with_label_values(&[reason.as_str()]).inc();
        debug!("Claim {} on {} released: {}", claim_id, claim.key, reason.as_str());
        Ok(claim)
    }

    /// Undo a finalize whose ticket could not be persisted.
    ///
    /// The sold marker is dropped and the claim goes back to `AwaitingGateway`
    /// with a fresh TTL in one step, so a redelivered callback can complete it.
    pub fn revert_sale(&self, claim: Claim) -> Result<Claim, LedgerError> {
        let mut state = self.lock();
        let key = claim.key;

        if state.by_key.contains_key(&key) {
            return Err(LedgerError::AlreadyClaimed(key));
        }
        state.sold.remove(&key);

        let mut claim = claim;
        claim.state = ClaimState::AwaitingGateway;
        claim.expires_at = Utc::now() + self.ttl;

        state.by_key.insert(key, claim.id.clone());
        if let Some(order_id) = claim.gateway_order_id() {
            state.by_order.insert(order_id.to_string(), claim.id.clone());
        }
        state.claims.insert(claim.id.clone(), claim.clone());
        ACTIVE_CLAIMS.set(state.claims.len() as i64);

        warn!("Sale of {} reverted, claim {} reinstated", key, claim.id);
        Ok(claim)
    }

    /// Evict every expired claim that is not mid-verification.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Claim> {
        let mut state = self.lock();
        let expired: Vec<String> = state
            .claims
            .values()
            .filter(|c| c.state != ClaimState::Verifying && c.is_expired_at(now))
            .map(|c| c.id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| Self::drop_claim(&mut state, id, ReleaseReason::Expired).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemeConfig;

    fn test_catalog() -> Arc<SchemeCatalog> {
        Arc::new(SchemeCatalog::from_config(&[SchemeConfig {
            id: 1,
            name: "Golden Chance".to_string(),
            start: 10_001,
            count: 10_000,
            ticket_price: 50,
            prefix: "AB".to_string(),
            suffix: "A".to_string(),
        }]))
    }

    fn ledger() -> ReservationLedger {
        ReservationLedger::new(test_catalog(), Duration::minutes(15))
    }

    fn buyer() -> BuyerProfile {
        BuyerProfile {
            full_name: "Ravi Kumar".to_string(),
            mobile: "9876543210".to_string(),
            state: "Bihar".to_string(),
            age: 25,
            aadhaar: None,
            email: None,
        }
    }

    fn order_for(claim: &Claim, gateway_order_id: &str) -> Order {
        Order {
            order_id: claim.id.clone(),
            scheme_id: claim.key.scheme_id,
            ticket_number: claim.key.ticket_number,
            amount: 5_000,
            currency: "INR".to_string(),
            gateway_order_id: gateway_order_id.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Walk a fresh claim up to `Verifying`.
    fn verifying_claim(ledger: &ReservationLedger, number: u32) -> Claim {
        let claim = ledger.try_claim(1, number, buyer()).unwrap();
        ledger
            .attach_order(&claim.id, order_for(&claim, &format!("order_{number}")))
            .unwrap();
        ledger.begin_verification(&claim.id).unwrap()
    }

    #[test]
    fn test_claim_then_duplicate_fails() {
        let ledger = ledger();
        let claim = ledger.try_claim(1, 10_050, buyer()).unwrap();
        assert_eq!(claim.state, ClaimState::Claimed);

        let second = ledger.try_claim(1, 10_050, buyer());
        assert!(matches!(second, Err(LedgerError::AlreadyClaimed(_))));
    }

    #[test]
    fn test_claim_out_of_range() {
        let ledger = ledger();
        let result = ledger.try_claim(1, 20_001, buyer());
        assert!(matches!(result, Err(LedgerError::Catalog(_))));
    }

    #[test]
    fn test_claim_invalid_profile() {
        let ledger = ledger();
        let mut profile = buyer();
        profile.age = 17;
        let result = ledger.try_claim(1, 10_050, profile);
        assert!(matches!(result, Err(LedgerError::InvalidProfile(_))));
        assert_eq!(ledger.active_claims(), 0);
    }

    #[test]
    fn test_concurrent_claims_exactly_one_wins() {
        let ledger = Arc::new(ledger());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.try_claim(1, 10_050, buyer()))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let granted = results.iter().filter(|r| r.is_ok()).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::AlreadyClaimed(_))))
            .count();

        assert_eq!(granted, 1);
        assert_eq!(refused, 15);
    }

    #[test]
    fn test_full_lifecycle_marks_sold() {
        let ledger = ledger();
        let claim = verifying_claim(&ledger, 10_050);

        let finalized = ledger.finalize(&claim.id).unwrap();
        assert_eq!(finalized.state, ClaimState::Finalized);
        assert!(ledger.is_sold(&claim.key));
        assert!(ledger.get(&claim.id).is_none());

        let again = ledger.try_claim(1, 10_050, buyer());
        assert!(matches!(again, Err(LedgerError::AlreadySold(_))));
    }

    #[test]
    fn test_finalize_requires_verifying() {
        let ledger = ledger();
        let claim = ledger.try_claim(1, 10_050, buyer()).unwrap();
        let result = ledger.finalize(&claim.id);
        assert!(matches!(
            result,
            Err(LedgerError::InvalidTransition {
                current: ClaimState::Claimed,
                ..
            })
        ));
    }

    #[test]
    fn test_finalize_on_seeded_sold_number_conflicts() {
        let ledger = ledger();
        let claim = verifying_claim(&ledger, 10_060);
        ledger.seed_sold([claim.key]);

        let result = ledger.finalize(&claim.id);
        assert!(matches!(result, Err(LedgerError::AlreadySold(_))));
    }

    #[test]
    fn test_release_returns_number() {
        let ledger = ledger();
        let claim = ledger.try_claim(1, 10_050, buyer()).unwrap();

        let released = ledger.release(&claim.id, ReleaseReason::Cancelled).unwrap();
        assert_eq!(released.state, ClaimState::Released);
        assert!(ledger.try_claim(1, 10_050, buyer()).is_ok());
    }

    #[test]
    fn test_release_refused_while_verifying() {
        let ledger = ledger();
        let claim = verifying_claim(&ledger, 10_050);
        let result = ledger.release(&claim.id, ReleaseReason::Cancelled);
        assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));
    }

    #[test]
    fn test_reject_verifying_claim() {
        let ledger = ledger();
        let claim = verifying_claim(&ledger, 10_050);
        let rejected = ledger
            .reject(&claim.id, ReleaseReason::SignatureRejected)
            .unwrap();
        assert_eq!(rejected.state, ClaimState::Rejected);
        assert!(!ledger.is_sold(&claim.key));
        assert!(ledger.claim_for_order("order_10050").is_none());
    }

    #[test]
    fn test_claim_for_order_index() {
        let ledger = ledger();
        let claim = ledger.try_claim(1, 10_050, buyer()).unwrap();
        ledger
            .attach_order(&claim.id, order_for(&claim, "order_abc"))
            .unwrap();

        let found = ledger.claim_for_order("order_abc").unwrap();
        assert_eq!(found.id, claim.id);
        assert_eq!(found.state, ClaimState::OrderCreated);
    }

    #[test]
    fn test_mark_gateway_open_idempotent() {
        let ledger = ledger();
        let claim = ledger.try_claim(1, 10_050, buyer()).unwrap();
        assert!(ledger.mark_gateway_open(&claim.id).is_err());

        ledger
            .attach_order(&claim.id, order_for(&claim, "order_x"))
            .unwrap();
        assert_eq!(
            ledger.mark_gateway_open(&claim.id).unwrap().state,
            ClaimState::AwaitingGateway
        );
        assert_eq!(
            ledger.mark_gateway_open(&claim.id).unwrap().state,
            ClaimState::AwaitingGateway
        );
    }

    #[test]
    fn test_sweep_releases_expired_claims() {
        let ledger = ledger();
        let start = Utc::now();
        let claim = ledger.try_claim_at(1, 10_050, buyer(), start).unwrap();

        assert!(ledger.sweep_expired(start + Duration::minutes(5)).is_empty());

        let swept = ledger.sweep_expired(start + Duration::minutes(16));
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, claim.id);
        assert!(ledger.try_claim(1, 10_050, buyer()).is_ok());
    }

    #[test]
    fn test_sweep_skips_verifying_claims() {
        let ledger = ledger();
        let claim = verifying_claim(&ledger, 10_050);

        let swept = ledger.sweep_expired(Utc::now() + Duration::hours(1));
        assert!(swept.is_empty());
        assert!(ledger.finalize(&claim.id).is_ok());
    }

    #[test]
    fn test_expired_claim_reclaimed_lazily() {
        let ledger = ledger();
        let start = Utc::now();
        ledger.try_claim_at(1, 10_050, buyer(), start).unwrap();

        let later = start + Duration::minutes(20);
        let claim = ledger.try_claim_at(1, 10_050, buyer(), later).unwrap();
        assert_eq!(claim.created_at, later);
        assert_eq!(ledger.active_claims(), 1);
    }

    #[test]
    fn test_revert_sale_reinstates_claim() {
        let ledger = ledger();
        let claim = verifying_claim(&ledger, 10_050);
        let finalized = ledger.finalize(&claim.id).unwrap();

        let reinstated = ledger.revert_sale(finalized).unwrap();
        assert_eq!(reinstated.state, ClaimState::AwaitingGateway);
        assert!(!ledger.is_sold(&claim.key));
        assert_eq!(ledger.claim_for_order("order_10050").unwrap().id, claim.id);

        // Still held, so nobody else can take the number.
        let other = ledger.try_claim(1, 10_050, buyer());
        assert!(matches!(other, Err(LedgerError::AlreadyClaimed(_))));

        ledger.begin_verification(&claim.id).unwrap();
        assert!(ledger.finalize(&claim.id).is_ok());
    }
}
