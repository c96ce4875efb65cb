//! End-to-end custodian scenarios

mod common;

use account_control::{sats_to_tokens, QcStatus, RedemptionStatus};
use common::*;

#[test]
fn test_mint_limited_by_attested_backing() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 100).unwrap();

    // 3-of-5: any three live attestations finalize
    assert_eq!(p.submit_attestation(&ctx(ATTESTERS[0], T0), QC, 40).unwrap(), None);
    assert_eq!(p.submit_attestation(&ctx(ATTESTERS[1], T0 + 10), QC, 70).unwrap(), None);
    assert_eq!(
        p.submit_attestation(&ctx(ATTESTERS[2], T0 + 20), QC, 50).unwrap(),
        Some(50)
    );
    assert_eq!(p.backing(&QC), 50);
    assert_eq!(p.get_reserve_balance_and_staleness(&QC, T0 + 20), (50, false));

    let err = p
        .mint(&ctx(QC, T0 + 30), QC, HOLDER, sats_to_tokens(60))
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_BACKING");
    assert_eq!(p.minted(&QC), 0);

    assert_eq!(
        p.mint(&ctx(QC, T0 + 30), QC, HOLDER, sats_to_tokens(40)).unwrap(),
        40
    );
    assert_eq!(p.minted(&QC), 40);
    assert_eq!(p.token().balance_of(&HOLDER), sats_to_tokens(40));
}

#[test]
fn test_payment_to_wrong_address_leads_to_default() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, 2 * BTC);
    let x = address_x();
    let y = address_y();

    let redemption = p
        .request_redemption(&ctx(HOLDER, T0 + HOUR), QC, sats_to_tokens(BTC), &x)
        .unwrap();
    assert_eq!(redemption.amount_sats, BTC);
    assert_eq!(p.minted(&QC), BTC);

    // Half a bitcoin to the wrong address
    let mined = mined_payment(&[(y.as_str(), BTC / 2)], DIFFICULTY_FACTOR as usize);
    let err = p
        .record_fulfillment(
            &ctx(ARBITER, T0 + 2 * HOUR),
            redemption.id,
            &x,
            BTC,
            &mined.tx_info,
            &mined.proof,
        )
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_PAYMENT");
    assert_eq!(
        p.get_redemption(&redemption.id).unwrap().status,
        RedemptionStatus::Pending
    );

    let err = p
        .flag_default(&ctx(ARBITER, redemption.deadline), redemption.id, "no payment")
        .unwrap_err();
    assert_eq!(err.code(), "DEADLINE_NOT_REACHED");

    let defaulted = p
        .flag_default(&ctx(ARBITER, redemption.deadline + 1), redemption.id, "no payment")
        .unwrap();
    assert_eq!(defaulted.status, RedemptionStatus::Defaulted);
    assert_eq!(defaulted.default_reason.as_deref(), Some("no payment"));
    assert_eq!(p.qc_status(&QC), Some(QcStatus::UnderReview));
    assert!(!p.has_unfulfilled_redemptions(&QC));
}

#[test]
fn test_self_pause_respects_redemption_deadlines() {
    let mut p = protocol();
    for qc in [QC, QC2] {
        p.authorize_reserve(&ctx(OWNER, T0), qc, 10 * BTC).unwrap();
        p.set_backing(&ctx(ORACLE, T0), qc, 10 * BTC).unwrap();
        p.mint(&ctx(qc, T0), qc, HOLDER, sats_to_tokens(BTC)).unwrap();
    }
    let x = address_x();

    // Deadline 2h out, pause 48h plus 8h buffer
    p.set_redemption_timeout(&ctx(OWNER, T0), 2 * HOUR).unwrap();
    p.request_redemption(&ctx(HOLDER, T0), QC, sats_to_tokens(10_000), &x)
        .unwrap();
    assert!(!p.can_self_pause(&QC, T0));
    let err = p.use_emergency_pause(&ctx(QC, T0), "hsm rotation").unwrap_err();
    assert_eq!(err.code(), "WOULD_BREACH_REDEMPTION_DEADLINE");
    assert_eq!(p.qc_status(&QC), Some(QcStatus::Active));
    assert!(p.get_pause_info(&QC).unwrap().has_credit);

    // Deadline 60h out
    p.set_redemption_timeout(&ctx(OWNER, T0), 60 * HOUR).unwrap();
    p.request_redemption(&ctx(HOLDER, T0), QC2, sats_to_tokens(10_000), &x)
        .unwrap();
    assert!(p.can_self_pause(&QC2, T0));
    let end = p.use_emergency_pause(&ctx(QC2, T0), "hsm rotation").unwrap();
    assert_eq!(end, T0 + 48 * HOUR);
    assert_eq!(p.qc_status(&QC2), Some(QcStatus::Paused));

    let info = p.get_pause_info(&QC2).unwrap();
    assert!(info.is_paused);
    assert!(!info.has_credit);
}

#[test]
fn test_revoked_attester_excluded_from_quorum() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 10 * BTC).unwrap();

    p.submit_attestation(&ctx(ATTESTERS[0], T0), QC, 1_000).unwrap();
    assert_eq!(p.pending_attestation_count(&QC, T0), 1);

    p.revoke_role(&ctx(OWNER, T0 + 1), account_control::Role::Attester, ATTESTERS[0])
        .unwrap();
    assert_eq!(p.pending_attestation_count(&QC, T0 + 1), 0);

    // Two remaining submissions do not reach the threshold of three
    assert_eq!(p.submit_attestation(&ctx(ATTESTERS[1], T0 + 2), QC, 900).unwrap(), None);
    assert_eq!(p.submit_attestation(&ctx(ATTESTERS[2], T0 + 3), QC, 950).unwrap(), None);
    let err = p.record_consensus_attestation(&ctx(HOLDER, T0 + 4), QC).unwrap_err();
    assert_eq!(err.code(), "QUORUM_NOT_MET");

    let err = p
        .submit_attestation(&ctx(ATTESTERS[0], T0 + 5), QC, 1_000)
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");
    assert_eq!(p.pending_attestation_count(&QC, T0 + 5), 2);

    assert_eq!(
        p.submit_attestation(&ctx(ATTESTERS[3], T0 + 6), QC, 1_000).unwrap(),
        Some(950)
    );
    assert_eq!(p.backing(&QC), 950);
}

#[test]
fn test_governance_escalation_and_recovery() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, BTC);

    p.set_qc_status(
        &ctx(MANAGER, T0 + 1),
        QC,
        QcStatus::MintingPaused,
        account_control::qc_state::StatusChangeReason::Governance,
    )
    .unwrap();
    let err = p
        .mint(&ctx(QC, T0 + 2), QC, HOLDER, sats_to_tokens(1_000))
        .unwrap_err();
    assert_eq!(err.code(), "MINTING_DISABLED");

    // Redemptions are still serviced while minting is paused
    p.request_redemption(&ctx(HOLDER, T0 + 3), QC, sats_to_tokens(10_000), &address_x())
        .unwrap();

    p.set_qc_status(
        &ctx(MANAGER, T0 + 4),
        QC,
        QcStatus::Active,
        account_control::qc_state::StatusChangeReason::Governance,
    )
    .unwrap();
    assert_eq!(
        p.mint(&ctx(QC, T0 + 5), QC, HOLDER, sats_to_tokens(1_000)).unwrap(),
        1_000
    );
}
