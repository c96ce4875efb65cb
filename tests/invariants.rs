//! Ledger and oracle properties under mixed operation sequences

mod common;

use account_control::{sats_to_tokens, AccountId, Protocol};
use common::*;

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn assert_consistent(p: &Protocol, custodians: &[AccountId]) {
    p.check_invariants().unwrap();

    let sum: u64 = custodians.iter().map(|qc| p.minted(qc)).sum();
    assert_eq!(p.total_minted(), sum);
    for qc in custodians {
        assert!(p.minted(qc) <= p.minting_cap(qc));
    }
    assert_eq!(p.token().total_supply(), sats_to_tokens(p.total_minted()));
}

#[test]
fn test_totals_hold_across_operation_sequence() {
    let custodians = [QC, QC2];
    let mut p = protocol();
    for qc in custodians {
        p.authorize_reserve(&ctx(OWNER, T0), qc, 5 * BTC).unwrap();
        p.set_backing(&ctx(ORACLE, T0), qc, 3 * BTC).unwrap();
    }

    let x = address_x();
    let mut rng = Lcg(7);
    let mut now = T0;
    let mut accepted = 0;

    for _ in 0..400 {
        now += rng.below(120);
        let qc = custodians[rng.below(2) as usize];

        let result = match rng.below(5) {
            0 | 1 => p
                .mint(&ctx(qc, now), qc, HOLDER, sats_to_tokens(1 + rng.below(BTC)))
                .map(|_| ()),
            2 => p
                .request_redemption(
                    &ctx(HOLDER, now),
                    qc,
                    sats_to_tokens(546 + rng.below(BTC / 2)),
                    &x,
                )
                .map(|_| ()),
            3 => p.set_backing(&ctx(ORACLE, now), qc, rng.below(6 * BTC)),
            _ => p
                .set_minting_cap(&ctx(OWNER, now), qc, 1 + rng.below(6 * BTC))
                .map(|_| ()),
        };
        if result.is_ok() {
            accepted += 1;
        }

        assert_consistent(&p, &custodians);
    }

    // The sequence exercises both accepted and rejected paths
    assert!(accepted > 0);
    assert!(accepted < 400);
}

#[test]
fn test_rejected_operations_leave_no_trace() {
    let mut p = funded_protocol(QC, 10 * BTC, BTC, BTC / 2);
    let before = p.state().clone();
    let events = p.events().len();

    let err = p
        .mint(&ctx(QC, T0 + 1), QC, HOLDER, sats_to_tokens(BTC))
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_BACKING");
    let err = p
        .request_redemption(&ctx(HOLDER, T0 + 1), QC, sats_to_tokens(100), &address_x())
        .unwrap_err();
    assert_eq!(err.code(), "BELOW_DUST");

    assert_eq!(format!("{:?}", p.state()), format!("{:?}", before));
    assert_eq!(p.events().len(), events);
}

#[test]
fn test_cap_boundary() {
    let mut p = funded_protocol(QC, BTC, 100 * BTC, 0);

    let err = p
        .mint(&ctx(QC, T0 + 1), QC, HOLDER, sats_to_tokens(BTC + 1))
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_CAP");

    assert_eq!(
        p.mint(&ctx(QC, T0 + 1), QC, HOLDER, sats_to_tokens(BTC)).unwrap(),
        BTC
    );
    assert_eq!(p.minted(&QC), p.minting_cap(&QC));

    let err = p
        .mint(&ctx(QC, T0 + 2), QC, HOLDER, sats_to_tokens(1))
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_CAP");
}

#[test]
fn test_expired_pause_resumes_once() {
    let mut p = funded_protocol(QC, BTC, BTC, 0);
    let end = p.use_emergency_pause(&ctx(QC, T0), "maintenance").unwrap();

    let err = p.resume_if_expired(&ctx(HOLDER, end - 1), QC).unwrap_err();
    assert_eq!(err.code(), "PAUSE_NOT_EXPIRED");

    p.resume_if_expired(&ctx(HOLDER, end), QC).unwrap();
    assert_eq!(p.qc_status(&QC), Some(account_control::QcStatus::Active));

    let err = p.resume_if_expired(&ctx(HOLDER, end + 2), QC).unwrap_err();
    assert_eq!(err.code(), "NOT_PAUSED");
}

#[test]
fn test_median_resists_single_outlier() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 10 * BTC).unwrap();
    p.set_consensus_threshold(&ctx(OWNER, T0), 5).unwrap();

    let balances = [100u128, 100, 100, 100, 1000];
    let mut consensus = None;
    for (attester, balance) in ATTESTERS.iter().zip(balances) {
        consensus = p.submit_attestation(&ctx(*attester, T0 + 1), QC, balance).unwrap();
    }
    assert_eq!(consensus, Some(100));
    assert_eq!(p.backing(&QC), 100);
}

#[test]
fn test_colluding_majority_sets_median() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 10 * BTC).unwrap();
    p.set_consensus_threshold(&ctx(OWNER, T0), 5).unwrap();

    let balances = [100u128, 100, 1000, 1000, 1000];
    let mut consensus = None;
    for (attester, balance) in ATTESTERS.iter().zip(balances) {
        consensus = p.submit_attestation(&ctx(*attester, T0 + 1), QC, balance).unwrap();
    }
    assert_eq!(consensus, Some(1000));
    assert_eq!(p.backing(&QC), 1000);
}

#[test]
fn test_threshold_cannot_exceed_pending_limit() {
    let mut p = protocol();
    let limit = params().oracle.max_pending_attestations;

    p.set_consensus_threshold(&ctx(OWNER, T0), limit).unwrap();
    let err = p
        .set_consensus_threshold(&ctx(OWNER, T0), limit + 1)
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ORACLE_PARAMETER");
}

#[test]
fn test_even_quorum_averages_middle_pair() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 10 * BTC).unwrap();
    p.set_consensus_threshold(&ctx(OWNER, T0), 6).unwrap();

    let balances = [1000u128, 1000, 1000, 100, 100, 100];
    let mut consensus = None;
    for (attester, balance) in ATTESTERS.iter().zip(balances) {
        consensus = p.submit_attestation(&ctx(*attester, T0 + 1), QC, balance).unwrap();
    }
    assert_eq!(consensus, Some(550));
    assert_eq!(p.attestation_record(&QC).unwrap().attestation_count, 6);
}
