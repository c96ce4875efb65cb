//! Reserve Oracle
//!
//! Collects independent balance attestations per custodian and finalizes a
//! consensus balance once enough live attestations exist. The consensus
//! value is the median of the live set, so a minority of outliers cannot
//! move it.
//!
//! Every submission first purges expired entries and entries from accounts
//! that no longer hold the attester capability. Purging is not an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{AccountId, SATS_PER_BTC};

/// Upper bound on any attested balance: the entire Bitcoin supply
pub const MAX_RESERVE_BALANCE_SATS: u64 = 21_000_000 * SATS_PER_BTC;

/// Oracle parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Distinct live attestations required to finalize
    pub consensus_threshold: usize,
    /// Seconds after which a pending attestation expires
    pub attestation_timeout: u64,
    /// Seconds after which a finalized record is stale
    pub staleness_threshold: u64,
    /// Cap on live pending attestations per custodian
    pub max_pending_attestations: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 3,
            attestation_timeout: 6 * 3600,
            staleness_threshold: 24 * 3600,
            max_pending_attestations: 32,
        }
    }
}

/// A pending balance submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub attester: AccountId,
    pub balance: u64,
    pub submitted_at: u64,
}

/// How a record was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Consensus,
    ArbiterOverride,
    EmergencySet,
}

/// Finalized reserve balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveAttestationRecord {
    pub qc: AccountId,
    pub consensus_balance: u64,
    pub timestamp: u64,
    /// Attestations that formed the consensus, zero for overrides
    pub attestation_count: usize,
    pub source: RecordSource,
}

impl ReserveAttestationRecord {
    pub fn is_stale(&self, now: u64, staleness_threshold: u64) -> bool {
        now.saturating_sub(self.timestamp) > staleness_threshold
    }
}

/// Result of a submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Entries dropped by the pre-submission purge
    pub purged: usize,
    /// Consensus balance and attestation count, when this call finalized
    pub consensus: Option<(u64, usize)>,
}

/// Oracle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("custodian is the zero account")]
    ZeroAccount,

    #[error("balance {0} exceeds the maximum reserve balance")]
    BalanceOutOfRange(u128),

    #[error("attester {0} already has a live attestation")]
    DuplicateAttestation(AccountId),

    #[error("pending attestations for {qc} at capacity ({max})")]
    TooManyPendingAttestations { qc: AccountId, max: usize },

    #[error("quorum not met: {live} live of {required} required")]
    QuorumNotMet { live: usize, required: usize },

    #[error("no attestation record for {0}")]
    NoRecord(AccountId),

    #[error("no pending attestations for {0}")]
    NothingPending(AccountId),

    #[error("invalid oracle parameter: {0}")]
    InvalidParameter(&'static str),
}

impl OracleError {
    pub fn code(&self) -> &'static str {
        match self {
            OracleError::ZeroAccount => "ZERO_ACCOUNT",
            OracleError::BalanceOutOfRange(_) => "BALANCE_OUT_OF_RANGE",
            OracleError::DuplicateAttestation(_) => "DUPLICATE_ATTESTATION",
            OracleError::TooManyPendingAttestations { .. } => "TOO_MANY_PENDING_ATTESTATIONS",
            OracleError::QuorumNotMet { .. } => "QUORUM_NOT_MET",
            OracleError::NoRecord(_) => "NO_ATTESTATION_RECORD",
            OracleError::NothingPending(_) => "NOTHING_PENDING",
            OracleError::InvalidParameter(_) => "INVALID_ORACLE_PARAMETER",
        }
    }
}

/// Median of a non-empty set; even counts take the floor of the mean of
/// the two middle values.
pub fn median(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let sum = sorted[mid - 1] as u128 + sorted[mid] as u128;
        Some((sum / 2) as u64)
    }
}

/// Attestation store and consensus engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReserveOracle {
    config: OracleConfig,
    pending: BTreeMap<AccountId, Vec<Attestation>>,
    records: BTreeMap<AccountId, ReserveAttestationRecord>,
}

impl ReserveOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Record a balance observation. `is_attester` reports whether an
    /// account currently holds the attester capability.
    pub fn submit_attestation(
        &mut self,
        qc: AccountId,
        attester: AccountId,
        balance: u128,
        now: u64,
        is_attester: impl Fn(&AccountId) -> bool,
    ) -> Result<SubmitOutcome, OracleError> {
        if qc.is_zero() {
            return Err(OracleError::ZeroAccount);
        }
        if balance > MAX_RESERVE_BALANCE_SATS as u128 {
            return Err(OracleError::BalanceOutOfRange(balance));
        }
        let balance = balance as u64;

        let purged = self.purge(&qc, now, &is_attester);

        let entries = self.pending.entry(qc).or_default();
        if entries.iter().any(|a| a.attester == attester) {
            return Err(OracleError::DuplicateAttestation(attester));
        }
        if entries.len() >= self.config.max_pending_attestations {
            return Err(OracleError::TooManyPendingAttestations {
                qc,
                max: self.config.max_pending_attestations,
            });
        }

        entries.push(Attestation {
            attester,
            balance,
            submitted_at: now,
        });

        let consensus = if entries.len() >= self.config.consensus_threshold {
            Some(self.finalize(qc, now))
        } else {
            None
        };

        Ok(SubmitOutcome { purged, consensus })
    }

    /// Finalize a round that already has enough live attestations, e.g.
    /// after the threshold was lowered.
    pub fn try_finalize(
        &mut self,
        qc: AccountId,
        now: u64,
        is_attester: impl Fn(&AccountId) -> bool,
    ) -> Result<(u64, usize), OracleError> {
        self.purge(&qc, now, &is_attester);

        let live = self.pending.get(&qc).map(Vec::len).unwrap_or(0);
        if live < self.config.consensus_threshold {
            return Err(OracleError::QuorumNotMet {
                live,
                required: self.config.consensus_threshold,
            });
        }
        Ok(self.finalize(qc, now))
    }

    fn finalize(&mut self, qc: AccountId, now: u64) -> (u64, usize) {
        let entries = self.pending.remove(&qc).unwrap_or_default();
        let balances: Vec<u64> = entries.iter().map(|a| a.balance).collect();
        let consensus_balance = median(&balances).unwrap_or(0);

        self.records.insert(
            qc,
            ReserveAttestationRecord {
                qc,
                consensus_balance,
                timestamp: now,
                attestation_count: entries.len(),
                source: RecordSource::Consensus,
            },
        );

        (consensus_balance, entries.len())
    }

    /// Drop expired entries and entries from revoked attesters
    fn purge(&mut self, qc: &AccountId, now: u64, is_attester: &impl Fn(&AccountId) -> bool) -> usize {
        let timeout = self.config.attestation_timeout;
        let Some(entries) = self.pending.get_mut(qc) else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|a| {
            now.saturating_sub(a.submitted_at) <= timeout && is_attester(&a.attester)
        });
        let purged = before - entries.len();

        if entries.is_empty() {
            self.pending.remove(qc);
        }
        purged
    }

    /// Remove an attester's entries across every custodian. Returns the
    /// custodians whose pending set changed.
    pub fn purge_attester(&mut self, attester: &AccountId) -> Vec<AccountId> {
        let mut touched = Vec::new();
        for (qc, entries) in self.pending.iter_mut() {
            let before = entries.len();
            entries.retain(|a| a.attester != *attester);
            if entries.len() != before {
                touched.push(*qc);
            }
        }
        self.pending.retain(|_, entries| !entries.is_empty());
        touched
    }

    /// Arbiter correction of an existing record
    pub fn override_attestation(
        &mut self,
        qc: AccountId,
        balance: u128,
        now: u64,
    ) -> Result<u64, OracleError> {
        let balance = bounded(balance)?;
        let record = self.records.get_mut(&qc).ok_or(OracleError::NoRecord(qc))?;
        let previous = record.consensus_balance;

        record.consensus_balance = balance;
        record.timestamp = now;
        record.attestation_count = 0;
        record.source = RecordSource::ArbiterOverride;

        Ok(previous)
    }

    /// Arbiter write that creates the record if missing
    pub fn emergency_set_reserve(
        &mut self,
        qc: AccountId,
        balance: u128,
        now: u64,
    ) -> Result<Option<u64>, OracleError> {
        if qc.is_zero() {
            return Err(OracleError::ZeroAccount);
        }
        let balance = bounded(balance)?;
        let previous = self.records.get(&qc).map(|r| r.consensus_balance);

        self.records.insert(
            qc,
            ReserveAttestationRecord {
                qc,
                consensus_balance: balance,
                timestamp: now,
                attestation_count: 0,
                source: RecordSource::EmergencySet,
            },
        );

        Ok(previous)
    }

    /// Discard a stuck round
    pub fn reset_consensus(&mut self, qc: &AccountId) -> Result<usize, OracleError> {
        match self.pending.remove(qc) {
            Some(entries) if !entries.is_empty() => Ok(entries.len()),
            _ => Err(OracleError::NothingPending(*qc)),
        }
    }

    /// Forget everything about a custodian
    pub fn remove_custodian(&mut self, qc: &AccountId) {
        self.pending.remove(qc);
        self.records.remove(qc);
    }

    /// (balance, is_stale); a custodian without a record reads as (0, stale)
    pub fn get_reserve_balance_and_staleness(&self, qc: &AccountId, now: u64) -> (u64, bool) {
        match self.records.get(qc) {
            Some(record) => (
                record.consensus_balance,
                record.is_stale(now, self.config.staleness_threshold),
            ),
            None => (0, true),
        }
    }

    pub fn record(&self, qc: &AccountId) -> Option<&ReserveAttestationRecord> {
        self.records.get(qc)
    }

    /// Non-expired pending entries
    pub fn pending_attestation_count(&self, qc: &AccountId, now: u64) -> usize {
        self.pending
            .get(qc)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|a| now.saturating_sub(a.submitted_at) <= self.config.attestation_timeout)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn pending_attestations(&self, qc: &AccountId) -> &[Attestation] {
        self.pending.get(qc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A threshold above the pending-attestation bound could never be met
    pub fn set_consensus_threshold(&mut self, threshold: usize) -> Result<(), OracleError> {
        if threshold == 0 || threshold > self.config.max_pending_attestations {
            return Err(OracleError::InvalidParameter("consensus_threshold"));
        }
        self.config.consensus_threshold = threshold;
        Ok(())
    }

    pub fn set_attestation_timeout(&mut self, timeout: u64) -> Result<(), OracleError> {
        if timeout == 0 {
            return Err(OracleError::InvalidParameter("attestation_timeout"));
        }
        self.config.attestation_timeout = timeout;
        Ok(())
    }

    pub fn set_staleness_threshold(&mut self, threshold: u64) -> Result<(), OracleError> {
        if threshold == 0 {
            return Err(OracleError::InvalidParameter("staleness_threshold"));
        }
        self.config.staleness_threshold = threshold;
        Ok(())
    }
}

fn bounded(balance: u128) -> Result<u64, OracleError> {
    if balance > MAX_RESERVE_BALANCE_SATS as u128 {
        return Err(OracleError::BalanceOutOfRange(balance));
    }
    Ok(balance as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const QC: AccountId = AccountId::from_byte(0xaa);

    fn attester(i: u8) -> AccountId {
        AccountId::from_byte(i)
    }

    fn oracle(threshold: usize) -> ReserveOracle {
        ReserveOracle::new(OracleConfig {
            consensus_threshold: threshold,
            attestation_timeout: 3600,
            staleness_threshold: 86_400,
            max_pending_attestations: 8,
        })
    }

    fn everyone(_: &AccountId) -> bool {
        true
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[7]), Some(7));
        assert_eq!(median(&[100, 100, 100, 100, 1000]), Some(100));
        assert_eq!(median(&[1000, 1000, 1000, 100, 100, 100]), Some(550));
        assert_eq!(median(&[1, 2]), Some(1));
        assert_eq!(median(&[u64::MAX, u64::MAX]), Some(u64::MAX));
    }

    #[test]
    fn test_outlier_bounded_consensus() {
        let mut o = oracle(5);
        let balances = [100u128, 100, 100, 100, 1000];
        let mut outcome = SubmitOutcome::default();
        for (i, b) in balances.iter().enumerate() {
            outcome = o
                .submit_attestation(QC, attester(i as u8 + 1), *b, 10, everyone)
                .unwrap();
        }
        assert_eq!(outcome.consensus, Some((100, 5)));
        assert_eq!(o.get_reserve_balance_and_staleness(&QC, 10), (100, false));
        assert_eq!(o.pending_attestation_count(&QC, 10), 0);
    }

    #[test]
    fn test_even_count_consensus() {
        let mut o = oracle(6);
        let balances = [1000u128, 1000, 1000, 100, 100, 100];
        for (i, b) in balances.iter().enumerate() {
            o.submit_attestation(QC, attester(i as u8 + 1), *b, 10, everyone)
                .unwrap();
        }
        assert_eq!(o.record(&QC).unwrap().consensus_balance, 550);
    }

    #[test]
    fn test_duplicate_rejected_until_expired() {
        let mut o = oracle(3);
        o.submit_attestation(QC, attester(1), 50, 0, everyone).unwrap();
        assert_eq!(
            o.submit_attestation(QC, attester(1), 60, 10, everyone),
            Err(OracleError::DuplicateAttestation(attester(1)))
        );

        // After expiry the attester may resubmit; the old entry is purged
        let outcome = o
            .submit_attestation(QC, attester(1), 60, 3601, everyone)
            .unwrap();
        assert_eq!(outcome.purged, 1);
        assert_eq!(o.pending_attestations(&QC)[0].balance, 60);
    }

    #[test]
    fn test_expired_entries_do_not_count() {
        let mut o = oracle(3);
        o.submit_attestation(QC, attester(1), 50, 0, everyone).unwrap();
        o.submit_attestation(QC, attester(2), 50, 0, everyone).unwrap();

        let outcome = o
            .submit_attestation(QC, attester(3), 50, 4000, everyone)
            .unwrap();
        assert_eq!(outcome.purged, 2);
        assert_eq!(outcome.consensus, None);
        assert_eq!(o.pending_attestation_count(&QC, 4000), 1);
    }

    #[test]
    fn test_stale_entries_never_block_capacity() {
        let mut o = oracle(10);
        for i in 1..=8 {
            o.submit_attestation(QC, attester(i), 50, 0, everyone).unwrap();
        }
        assert!(matches!(
            o.submit_attestation(QC, attester(9), 50, 1, everyone),
            Err(OracleError::TooManyPendingAttestations { .. })
        ));

        // Once the full set expires a fresh submitter gets in
        assert!(o.submit_attestation(QC, attester(9), 50, 5000, everyone).is_ok());
    }

    #[test]
    fn test_revoked_attester_filtered() {
        let mut o = oracle(3);
        o.submit_attestation(QC, attester(1), 50, 0, everyone).unwrap();
        o.submit_attestation(QC, attester(2), 50, 0, everyone).unwrap();

        let active: BTreeSet<AccountId> = [attester(2), attester(3)].into_iter().collect();
        let outcome = o
            .submit_attestation(QC, attester(3), 50, 1, |a| active.contains(a))
            .unwrap();
        assert_eq!(outcome.purged, 1);
        assert_eq!(outcome.consensus, None);
    }

    #[test]
    fn test_purge_attester_across_custodians() {
        let other = AccountId::from_byte(0xbb);
        let mut o = oracle(3);
        o.submit_attestation(QC, attester(1), 50, 0, everyone).unwrap();
        o.submit_attestation(other, attester(1), 50, 0, everyone).unwrap();
        o.submit_attestation(other, attester(2), 50, 0, everyone).unwrap();

        let touched = o.purge_attester(&attester(1));
        assert_eq!(touched.len(), 2);
        assert!(o.pending_attestations(&QC).is_empty());
        assert_eq!(o.pending_attestations(&other).len(), 1);
    }

    #[test]
    fn test_balance_bound() {
        let mut o = oracle(1);
        let too_big = MAX_RESERVE_BALANCE_SATS as u128 + 1;
        assert_eq!(
            o.submit_attestation(QC, attester(1), too_big, 0, everyone),
            Err(OracleError::BalanceOutOfRange(too_big))
        );
        assert!(o
            .submit_attestation(QC, attester(1), MAX_RESERVE_BALANCE_SATS as u128, 0, everyone)
            .is_ok());
    }

    #[test]
    fn test_arbiter_paths() {
        let mut o = oracle(3);
        assert_eq!(o.override_attestation(QC, 10, 0), Err(OracleError::NoRecord(QC)));

        assert_eq!(o.emergency_set_reserve(QC, 10, 0), Ok(None));
        assert_eq!(o.override_attestation(QC, 20, 5), Ok(10));
        let record = o.record(&QC).unwrap();
        assert_eq!(record.source, RecordSource::ArbiterOverride);
        assert_eq!(record.timestamp, 5);

        assert_eq!(o.reset_consensus(&QC), Err(OracleError::NothingPending(QC)));
        o.submit_attestation(QC, attester(1), 50, 0, everyone).unwrap();
        assert_eq!(o.reset_consensus(&QC), Ok(1));
    }

    #[test]
    fn test_staleness() {
        let mut o = oracle(1);
        assert_eq!(o.get_reserve_balance_and_staleness(&QC, 0), (0, true));

        o.submit_attestation(QC, attester(1), 75, 100, everyone).unwrap();
        assert_eq!(o.get_reserve_balance_and_staleness(&QC, 100 + 86_400), (75, false));
        assert_eq!(o.get_reserve_balance_and_staleness(&QC, 100 + 86_401), (75, true));
    }

    #[test]
    fn test_try_finalize_after_threshold_lowered() {
        let mut o = oracle(3);
        o.submit_attestation(QC, attester(1), 40, 0, everyone).unwrap();
        o.submit_attestation(QC, attester(2), 60, 0, everyone).unwrap();
        assert_eq!(
            o.try_finalize(QC, 1, everyone),
            Err(OracleError::QuorumNotMet { live: 2, required: 3 })
        );

        o.set_consensus_threshold(2).unwrap();
        assert_eq!(o.try_finalize(QC, 1, everyone), Ok((50, 2)));
        assert_eq!(o.set_consensus_threshold(0), Err(OracleError::InvalidParameter("consensus_threshold")));
    }

    #[test]
    fn test_threshold_bounded_by_pending_limit() {
        let mut o = oracle(3);
        o.set_consensus_threshold(8).unwrap();
        assert_eq!(
            o.set_consensus_threshold(9),
            Err(OracleError::InvalidParameter("consensus_threshold"))
        );
        assert_eq!(o.config().consensus_threshold, 8);
    }

    #[test]
    fn test_colluding_majority_sets_median() {
        let mut o = oracle(5);
        let balances = [100u128, 100, 1000, 1000, 1000];
        let mut consensus = None;
        for (i, balance) in balances.into_iter().enumerate() {
            consensus = o
                .submit_attestation(QC, attester(i as u8 + 1), balance, 0, everyone)
                .unwrap()
                .consensus;
        }
        // Three of five agree, so the honest pair cannot pull the median down
        assert_eq!(consensus, Some((1000, 5)));
        assert_eq!(o.record(&QC).unwrap().consensus_balance, 1000);
    }
}
