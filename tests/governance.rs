//! Operator and council controls through the protocol facade

mod common;

use account_control::account_control::PauseScope;
use account_control::oracle::RecordSource;
use account_control::{sats_to_tokens, QcStatus};
use common::*;

#[test]
fn test_arbiter_reserve_corrections() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 10 * BTC).unwrap();
    for attester in &ATTESTERS[..3] {
        p.submit_attestation(&ctx(*attester, T0), QC, 1_000).unwrap();
    }
    assert_eq!(p.backing(&QC), 1_000);

    let err = p
        .override_attestation(&ctx(ATTESTERS[0], T0 + 1), QC, 800)
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");

    p.override_attestation(&ctx(ARBITER, T0 + 1), QC, 800).unwrap();
    assert_eq!(p.backing(&QC), 800);
    let record = p.attestation_record(&QC).unwrap();
    assert_eq!(record.source, RecordSource::ArbiterOverride);
    assert_eq!(record.timestamp, T0 + 1);

    // Override needs an existing record; the emergency write does not
    let err = p
        .override_attestation(&ctx(ARBITER, T0 + 2), QC2, 500)
        .unwrap_err();
    assert_eq!(err.code(), "NO_ATTESTATION_RECORD");
    p.emergency_set_reserve(&ctx(ARBITER, T0 + 2), QC2, 500).unwrap();
    assert_eq!(
        p.attestation_record(&QC2).unwrap().source,
        RecordSource::EmergencySet
    );

    // A record written before authorization becomes the opening backing
    p.authorize_reserve(&ctx(OWNER, T0 + 3), QC2, 10 * BTC).unwrap();
    assert_eq!(p.backing(&QC2), 500);
}

#[test]
fn test_reset_discards_stuck_round() {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), QC, 10 * BTC).unwrap();
    p.submit_attestation(&ctx(ATTESTERS[0], T0), QC, 1_000).unwrap();
    p.submit_attestation(&ctx(ATTESTERS[1], T0), QC, 2_000).unwrap();

    assert_eq!(p.reset_consensus(&ctx(ARBITER, T0 + 1), QC).unwrap(), 2);
    assert_eq!(p.pending_attestation_count(&QC, T0 + 1), 0);

    let err = p.reset_consensus(&ctx(ARBITER, T0 + 2), QC).unwrap_err();
    assert_eq!(err.code(), "NOTHING_PENDING");

    // The same attesters may submit again in a fresh round
    assert_eq!(
        p.submit_attestation(&ctx(ATTESTERS[0], T0 + 3), QC, 1_500).unwrap(),
        None
    );
}

#[test]
fn test_wallet_registry() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, 0);
    let wallet = address(0x42);

    let err = p.register_wallet(&ctx(QC, T0), QC, &wallet).unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");

    p.register_wallet(&ctx(MANAGER, T0), QC, &wallet).unwrap();
    assert!(p.qc_record(&QC).unwrap().wallets.contains(&wallet));

    let err = p.register_wallet(&ctx(MANAGER, T0), QC, &wallet).unwrap_err();
    assert_eq!(err.code(), "WALLET_ALREADY_REGISTERED");

    let err = p
        .register_wallet(&ctx(MANAGER, T0), QC, "not-a-bitcoin-address")
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_BTC_ADDRESS");

    p.deregister_wallet(&ctx(MANAGER, T0 + 1), QC, &wallet).unwrap();
    assert!(p.qc_record(&QC).unwrap().wallets.is_empty());
    let err = p
        .deregister_wallet(&ctx(MANAGER, T0 + 2), QC, &wallet)
        .unwrap_err();
    assert_eq!(err.code(), "WALLET_NOT_REGISTERED");
}

#[test]
fn test_batch_backing_all_or_nothing() {
    let mut p = protocol();
    for qc in [QC, QC2] {
        p.authorize_reserve(&ctx(OWNER, T0), qc, 10 * BTC).unwrap();
    }

    p.batch_set_backing(&ctx(ORACLE, T0 + 1), &[(QC, 5 * BTC), (QC2, 7 * BTC)])
        .unwrap();
    assert_eq!(p.backing(&QC), 5 * BTC);
    assert_eq!(p.backing(&QC2), 7 * BTC);

    let err = p
        .batch_set_backing(&ctx(ORACLE, T0 + 2), &[(QC, BTC), (HOLDER, BTC)])
        .unwrap_err();
    assert_eq!(err.code(), "RESERVE_NOT_AUTHORIZED");
    assert_eq!(p.backing(&QC), 5 * BTC);
}

#[test]
fn test_custodian_redeems_own_tokens() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, 0);
    p.mint(&ctx(QC, T0), QC, QC, sats_to_tokens(BTC)).unwrap();

    let err = p
        .redeem(&ctx(HOLDER, T0 + 1), QC, sats_to_tokens(BTC / 2))
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");

    assert_eq!(
        p.redeem(&ctx(QC, T0 + 1), QC, sats_to_tokens(BTC / 2)).unwrap(),
        BTC / 2
    );
    assert_eq!(p.minted(&QC), BTC / 2);
    assert_eq!(p.token().balance_of(&QC), sats_to_tokens(BTC / 2));

    let err = p
        .redeem(&ctx(QC, T0 + 2), QC, sats_to_tokens(BTC))
        .unwrap_err();
    assert_eq!(err.code(), "EXCEEDS_MINTED");
    assert_eq!(p.minted(&QC), BTC / 2);
}

#[test]
fn test_global_and_reserve_pauses() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, BTC);
    let x = address_x();

    let err = p.pause(&ctx(HOLDER, T0), PauseScope::System).unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");

    p.pause(&ctx(COUNCIL, T0), PauseScope::System).unwrap();
    let err = p
        .mint(&ctx(QC, T0 + 1), QC, HOLDER, sats_to_tokens(1_000))
        .unwrap_err();
    assert_eq!(err.code(), "SYSTEM_PAUSED");

    // Only the owner lifts a pause
    let err = p.unpause(&ctx(COUNCIL, T0 + 2), PauseScope::System).unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");
    p.unpause(&ctx(OWNER, T0 + 2), PauseScope::System).unwrap();

    p.pause(&ctx(OWNER, T0 + 3), PauseScope::Redemptions).unwrap();
    let err = p
        .request_redemption(&ctx(HOLDER, T0 + 3), QC, sats_to_tokens(10_000), &x)
        .unwrap_err();
    assert_eq!(err.code(), "REDEMPTIONS_PAUSED");
    let err = p.pause(&ctx(OWNER, T0 + 3), PauseScope::Redemptions).unwrap_err();
    assert_eq!(err.code(), "ALREADY_PAUSED");
    p.unpause(&ctx(OWNER, T0 + 4), PauseScope::Redemptions).unwrap();

    p.pause(&ctx(COUNCIL, T0 + 5), PauseScope::Reserve(QC)).unwrap();
    let err = p
        .mint(&ctx(QC, T0 + 5), QC, HOLDER, sats_to_tokens(1_000))
        .unwrap_err();
    assert_eq!(err.code(), "RESERVE_PAUSED");

    // Redemptions against a paused reserve still go through
    p.request_redemption(&ctx(HOLDER, T0 + 6), QC, sats_to_tokens(10_000), &x)
        .unwrap();
}

#[test]
fn test_pause_credit_renewal() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, 0);

    p.use_emergency_pause(&ctx(QC, T0), "key ceremony").unwrap();
    p.resume_early(&ctx(QC, T0 + HOUR), QC).unwrap();
    assert_eq!(p.qc_status(&QC), Some(QcStatus::Active));

    let err = p.use_emergency_pause(&ctx(QC, T0 + 2 * HOUR), "again").unwrap_err();
    assert_eq!(err.code(), "NO_CREDIT_AVAILABLE");

    let err = p
        .renew_pause_credit(&ctx(QC, T0 + 2 * HOUR), QC)
        .unwrap_err();
    assert_eq!(err.code(), "RENEWAL_PERIOD_NOT_ELAPSED");

    p.renew_pause_credit(&ctx(QC, T0 + 90 * DAY), QC).unwrap();
    assert!(p.get_pause_info(&QC).unwrap().has_credit);

    let err = p
        .renew_pause_credit(&ctx(QC, T0 + 90 * DAY), QC)
        .unwrap_err();
    assert_eq!(err.code(), "CREDIT_ALREADY_AVAILABLE");
}

#[test]
fn test_council_clears_pause_and_restores_credit() {
    let mut p = funded_protocol(QC, 10 * BTC, 10 * BTC, 0);
    p.use_emergency_pause(&ctx(QC, T0), "incident").unwrap();

    let err = p
        .emergency_clear_pause(&ctx(HOLDER, T0 + 1), QC)
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_CAPABILITY");

    p.emergency_clear_pause(&ctx(COUNCIL, T0 + 1), QC).unwrap();
    assert_eq!(p.qc_status(&QC), Some(QcStatus::Active));
    assert!(!p.get_pause_info(&QC).unwrap().has_credit);

    p.emergency_restore_credit(&ctx(COUNCIL, T0 + 2), QC).unwrap();
    assert!(p.can_self_pause(&QC, T0 + 2));
    p.use_emergency_pause(&ctx(QC, T0 + 3), "incident follow-up")
        .unwrap();
    assert_eq!(p.qc_status(&QC), Some(QcStatus::Paused));
}
