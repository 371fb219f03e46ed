//! Integration tests for `SqliteLedger` against an in-memory database.

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use chrono::{DateTime, Duration, Utc};
use sward_core::{
  Classify, ErrorKind,
  clock::ManualClock,
  code::{
    ATTEMPTS_PER_LENGTH, CODE_LENGTH, CodeSource, WIDE_CODE_LENGTH,
    is_well_formed,
  },
  ledger::ReferralLedger,
  referral::{Amount, NewReward, Settlement, UseStatus},
  validation::{CodeCheck, Rejection},
};

use crate::{Error, LedgerConfig, SqliteLedger};

const ALICE: &str = "alice@example.com";
const BOB: &str = "bob@example.com";
const CAROL: &str = "carol@example.com";

fn start() -> DateTime<Utc> {
  DateTime::from_timestamp(1_735_689_600, 0).unwrap()
}

async fn ledger() -> (SqliteLedger, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(start()));
  let ledger = SqliteLedger::open_in_memory()
    .await
    .expect("in-memory ledger")
    .with_clock(clock.clone());
  (ledger, clock)
}

fn twenty() -> Amount { Amount::from_cents(2000) }

fn eligible(referrer: &str) -> CodeCheck {
  CodeCheck::Eligible { referrer: referrer.into() }
}

fn rejected(reason: Rejection) -> CodeCheck { CodeCheck::Rejected { reason } }

/// Proposes `first` for the first `repeats` draws, then `then`, each
/// repeated to the requested length. Counts every draw.
fn scripted_source(
  first: &'static str,
  repeats: usize,
  then: &'static str,
  draws: Arc<AtomicUsize>,
) -> CodeSource {
  Arc::new(move |len| {
    let n = draws.fetch_add(1, Ordering::SeqCst);
    let unit = if n < repeats { first } else { then };
    unit.repeat(len)
  })
}

// ─── Codes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_code_issues_well_formed_unique_codes() {
  let (l, _) = ledger().await;

  let mut seen = HashSet::new();
  for _ in 0..200 {
    let code = l.create_code(ALICE.into(), None).await.unwrap();
    assert_eq!(code.code.len(), CODE_LENGTH);
    assert!(is_well_formed(&code.code));
    assert!(seen.insert(code.code), "duplicate code issued");
  }
}

#[tokio::test]
async fn create_code_defaults() {
  let (l, _) = ledger().await;

  let code = l.create_code(ALICE.into(), None).await.unwrap();
  assert_eq!(code.referrer, ALICE);
  assert_eq!(code.created_at, start());
  assert_eq!(code.expires_at, None);
  assert_eq!(code.usage_count, 0);
  assert!(code.is_active);

  let fetched = l.get_code(code.code.clone()).await.unwrap().unwrap();
  assert_eq!(fetched.code, code.code);
  assert_eq!(fetched.referrer, ALICE);
  assert_eq!(fetched.expires_at, None);
  assert!(fetched.is_active);
}

#[tokio::test]
async fn create_code_with_expiration() {
  let (l, _) = ledger().await;

  let code = l.create_code(ALICE.into(), Some(30)).await.unwrap();
  assert_eq!(code.expires_at, Some(start() + Duration::days(30)));

  let fetched = l.get_code(code.code).await.unwrap().unwrap();
  assert_eq!(fetched.expires_at, Some(start() + Duration::days(30)));
}

#[tokio::test]
async fn code_collision_draws_a_fresh_token() {
  let (l, _) = ledger().await;
  let draws = Arc::new(AtomicUsize::new(0));
  let l = l.with_code_source(scripted_source("A", 2, "B", draws.clone()));

  assert_eq!(l.create_code(ALICE.into(), None).await.unwrap().code, "AAAAAAAA");
  assert_eq!(l.create_code(BOB.into(), None).await.unwrap().code, "BBBBBBBB");
  assert_eq!(draws.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn repeated_collisions_widen_then_exhaust() {
  let (l, _) = ledger().await;
  let draws = Arc::new(AtomicUsize::new(0));
  let l = l.with_code_source(scripted_source("A", usize::MAX, "A", draws.clone()));

  let short = l.create_code(ALICE.into(), None).await.unwrap();
  assert_eq!(short.code.len(), CODE_LENGTH);
  assert_eq!(draws.load(Ordering::SeqCst), 1);

  // Every short draw collides, so the sixth draw is a wide one.
  let wide = l.create_code(ALICE.into(), None).await.unwrap();
  assert_eq!(wide.code.len(), WIDE_CODE_LENGTH);
  assert_eq!(draws.load(Ordering::SeqCst), 1 + ATTEMPTS_PER_LENGTH + 1);

  let err = l.create_code(ALICE.into(), None).await.unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::CodeSpaceExhausted)));
  assert_eq!(err.kind(), ErrorKind::Internal);
  assert_eq!(
    draws.load(Ordering::SeqCst),
    1 + ATTEMPTS_PER_LENGTH + 1 + 2 * ATTEMPTS_PER_LENGTH
  );

  let stats = l.get_statistics(ALICE.into()).await.unwrap();
  assert_eq!(stats.active_codes.len(), 2);
}

#[tokio::test]
async fn oversized_code_lifetime_is_refused() {
  let (l, _) = ledger().await;

  let err = l.create_code(ALICE.into(), Some(100_000_000)).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Ledger(sward_core::Error::InvalidLifetime(100_000_000))
  ));
  assert_eq!(err.kind(), ErrorKind::Invalid);

  let stats = l.get_statistics(ALICE.into()).await.unwrap();
  assert!(stats.active_codes.is_empty());
}

#[tokio::test]
async fn get_code_missing_returns_none() {
  let (l, _) = ledger().await;
  assert!(l.get_code("NOPE0000".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_referrer_rejected_when_check_enabled() {
  let (l, _) = ledger().await;
  let l = l.with_referrer_check(true);

  let err = l.create_code(ALICE.into(), None).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Ledger(sward_core::Error::UnknownReferrer(ref who)) if who == ALICE
  ));
  assert_eq!(err.kind(), ErrorKind::NotFound);

  let first = l.register_customer(ALICE.into()).await.unwrap();
  let again = l.register_customer(ALICE.into()).await.unwrap();
  assert_eq!(first.created_at, again.created_at);

  assert!(l.create_code(ALICE.into(), None).await.is_ok());
}

#[tokio::test]
async fn unknown_referrer_allowed_when_check_disabled() {
  let (l, _) = ledger().await;
  assert!(l.create_code("nobody@example.com".into(), None).await.is_ok());
}

#[tokio::test]
async fn deactivate_code_is_soft() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  let deactivated = l.deactivate_code(code.code.clone()).await.unwrap();
  assert!(!deactivated.is_active);

  // Still present, just inactive.
  let fetched = l.get_code(code.code).await.unwrap().unwrap();
  assert!(!fetched.is_active);
}

#[tokio::test]
async fn deactivate_unknown_code_errors() {
  let (l, _) = ledger().await;
  let err = l.deactivate_code("NOPE0000".into()).await.unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::CodeNotFound(_))));
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn validate_accepts_fresh_referee() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  let check = l.validate_code(code.code, BOB.into()).await.unwrap();
  assert_eq!(check, eligible(ALICE));
}

#[tokio::test]
async fn validate_normalizes_entered_code() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  let typed = format!(" {} ", code.code.to_lowercase());
  let check = l.validate_code(typed, BOB.into()).await.unwrap();
  assert_eq!(check, eligible(ALICE));
}

#[tokio::test]
async fn validate_unknown_code() {
  let (l, _) = ledger().await;
  let check = l.validate_code("ZZZZZZZZ".into(), BOB.into()).await.unwrap();
  assert_eq!(check, rejected(Rejection::InvalidCode));
}

#[tokio::test]
async fn validate_inactive_code() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  l.deactivate_code(code.code.clone()).await.unwrap();

  let check = l.validate_code(code.code, BOB.into()).await.unwrap();
  assert_eq!(check, rejected(Rejection::CodeInactive));
}

#[tokio::test]
async fn zero_day_code_expires_after_one_second() {
  let (l, clock) = ledger().await;
  let code = l.create_code(ALICE.into(), Some(0)).await.unwrap();

  clock.advance(Duration::seconds(1));
  let check = l.validate_code(code.code, BOB.into()).await.unwrap();
  assert_eq!(check, rejected(Rejection::CodeExpired));
}

#[tokio::test]
async fn non_expiring_code_never_expires() {
  let (l, clock) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  clock.advance(Duration::days(365 * 20));
  let check = l.validate_code(code.code, BOB.into()).await.unwrap();
  assert_eq!(check, eligible(ALICE));
}

#[tokio::test]
async fn own_code_is_self_referral() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  let check = l.validate_code(code.code, ALICE.into()).await.unwrap();
  assert_eq!(check, rejected(Rejection::SelfReferral));
}

#[tokio::test]
async fn validate_is_side_effect_free() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  for _ in 0..3 {
    let check = l.validate_code(code.code.clone(), BOB.into()).await.unwrap();
    assert_eq!(check, eligible(ALICE));
  }
  let fetched = l.get_code(code.code).await.unwrap().unwrap();
  assert_eq!(fetched.usage_count, 0);
}

// ─── Recording uses ──────────────────────────────────────────────────────────

#[tokio::test]
async fn record_use_increments_usage_count_once() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();

  let used = l
    .record_use(code.code.clone(), BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();
  assert_eq!(used.referral_code, code.code);
  assert_eq!(used.referee, BOB);
  assert_eq!(used.order_id, "pi_1");
  assert_eq!(used.reward_status, UseStatus::Pending);
  assert_eq!(used.reward_amount, twenty());

  let fetched = l.get_code(code.code).await.unwrap().unwrap();
  assert_eq!(fetched.usage_count, 1);
}

#[tokio::test]
async fn referee_is_only_ever_referred_once() {
  let (l, _) = ledger().await;
  let c1 = l.create_code(ALICE.into(), None).await.unwrap();
  let c2 = l.create_code(CAROL.into(), None).await.unwrap();

  l.record_use(c1.code.clone(), BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  // Any code, not just the one already used.
  for code in [&c1.code, &c2.code] {
    let check = l.validate_code(code.clone(), BOB.into()).await.unwrap();
    assert_eq!(check, rejected(Rejection::AlreadyReferred));

    let err = l
      .record_use(code.clone(), BOB.into(), "pi_2".into(), twenty())
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      Error::Ledger(sward_core::Error::AlreadyReferred(ref who)) if who == BOB
    ));
  }

  // The failed attempts left no trace.
  assert_eq!(l.get_code(c1.code).await.unwrap().unwrap().usage_count, 1);
  assert_eq!(l.get_code(c2.code).await.unwrap().unwrap().usage_count, 0);
  assert_eq!(l.get_statistics(ALICE.into()).await.unwrap().total_referrals, 1);
  assert_eq!(l.get_statistics(CAROL.into()).await.unwrap().total_referrals, 0);
}

#[tokio::test]
async fn unique_constraint_catches_validate_record_race() {
  let (l, _) = ledger().await;
  let c1 = l.create_code(ALICE.into(), None).await.unwrap();
  let c2 = l.create_code(CAROL.into(), None).await.unwrap();

  // Two checkouts for the same referee both pass validation first.
  assert_eq!(l.validate_code(c1.code.clone(), BOB.into()).await.unwrap(), eligible(ALICE));
  assert_eq!(l.validate_code(c2.code.clone(), BOB.into()).await.unwrap(), eligible(CAROL));

  l.record_use(c1.code, BOB.into(), "pi_a".into(), twenty())
    .await
    .unwrap();
  let err = l
    .record_use(c2.code, BOB.into(), "pi_b".into(), twenty())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::AlreadyReferred(_))));
}

#[tokio::test]
async fn record_use_unknown_code_errors() {
  let (l, _) = ledger().await;
  let err = l
    .record_use("NOPE0000".into(), BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::CodeNotFound(_))));
}

#[tokio::test]
async fn find_use_by_order() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_123".into(), twenty())
    .await
    .unwrap();

  let found = l.find_use_by_order("pi_123".into()).await.unwrap().unwrap();
  assert_eq!(found.id, used.id);
  assert_eq!(found.referee, BOB);
  assert_eq!(found.used_at, start());

  assert!(l.find_use_by_order("pi_other".into()).await.unwrap().is_none());
}

// ─── Use status ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn use_status_moves_forward_once() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  let updated = l.update_use_status(used.id, UseStatus::Completed).await.unwrap();
  assert_eq!(updated.reward_status, UseStatus::Completed);

  let err = l
    .update_use_status(used.id, UseStatus::Completed)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::AlreadySettled(id)) if id == used.id));

  let err = l
    .update_use_status(used.id, UseStatus::Pending)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Ledger(sward_core::Error::InvalidTransition { .. })
  ));
}

#[tokio::test]
async fn update_status_of_unknown_use_errors() {
  let (l, _) = ledger().await;
  let err = l.update_use_status(42, UseStatus::Completed).await.unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::UseNotFound(42))));
}

// ─── Rewards ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_reward_defaults_to_180_days() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  let mut input = NewReward::new(ALICE, twenty(), used.id);
  input.external_credit_ref = Some("cbtxn_1".into());
  let reward = l.create_reward(input).await.unwrap();

  assert_eq!(reward.recipient, ALICE);
  assert_eq!(reward.amount, twenty());
  assert_eq!(reward.created_at, start());
  assert_eq!(reward.expires_at, start() + Duration::days(180));
  assert_eq!(reward.referral_use_id, Some(used.id));
  assert_eq!(reward.external_credit_ref.as_deref(), Some("cbtxn_1"));

  // Creating a reward does not settle the use.
  let use_now = l.find_use_by_order("pi_1".into()).await.unwrap().unwrap();
  assert_eq!(use_now.reward_status, UseStatus::Pending);
}

#[tokio::test]
async fn one_reward_per_use() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  l.create_reward(NewReward::new(ALICE, twenty(), used.id))
    .await
    .unwrap();
  let err = l
    .create_reward(NewReward::new(ALICE, twenty(), used.id))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::RewardExists(_))));
  assert_eq!(l.list_rewards(ALICE.into()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reward_for_unknown_use_errors() {
  let (l, _) = ledger().await;
  let err = l
    .create_reward(NewReward::new(ALICE, twenty(), 7))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::UseNotFound(7))));
}

#[tokio::test]
async fn active_rewards_exclude_expired() {
  let (l, clock) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let u1 = l
    .record_use(code.code.clone(), BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();
  let u2 = l
    .record_use(code.code, CAROL.into(), "pi_2".into(), twenty())
    .await
    .unwrap();

  let mut short = NewReward::new(ALICE, twenty(), u1.id);
  short.validity_days = 10;
  let short = l.create_reward(short).await.unwrap();
  let long = l
    .create_reward(NewReward::new(ALICE, twenty(), u2.id))
    .await
    .unwrap();

  let active = l.get_active_rewards(ALICE.into()).await.unwrap();
  assert_eq!(active.iter().map(|r| r.id).collect::<Vec<_>>(), vec![short.id, long.id]);

  // Exactly at expiry the short reward is gone.
  clock.advance(Duration::days(10));
  let active = l.get_active_rewards(ALICE.into()).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].id, long.id);
  let now = start() + Duration::days(10);
  assert!(active.iter().all(|r| r.is_active(now)));

  // History keeps both.
  let all = l.list_rewards(ALICE.into()).await.unwrap();
  assert_eq!(all.len(), 2);
  assert!(all[0].is_expired(now));
}

#[tokio::test]
async fn active_rewards_are_per_recipient() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();
  l.create_reward(NewReward::new(ALICE, twenty(), used.id))
    .await
    .unwrap();

  assert!(l.get_active_rewards(CAROL.into()).await.unwrap().is_empty());
}

// ─── Settlement ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn settle_reward_creates_reward_and_completes_use() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  let reward = l
    .settle_reward(used.id, Settlement {
      external_credit_ref: Some("cbtxn_9".into()),
      ..Settlement::default()
    })
    .await
    .unwrap();
  assert_eq!(reward.recipient, ALICE);
  assert_eq!(reward.amount, twenty());
  assert_eq!(reward.referral_use_id, Some(used.id));
  assert_eq!(reward.external_credit_ref.as_deref(), Some("cbtxn_9"));
  assert_eq!(reward.expires_at, start() + Duration::days(180));

  let settled = l.find_use_by_order("pi_1".into()).await.unwrap().unwrap();
  assert_eq!(settled.reward_status, UseStatus::Completed);
}

#[tokio::test]
async fn settle_reward_amount_override() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  let reward = l
    .settle_reward(used.id, Settlement {
      amount: Some(Amount::from_cents(2500)),
      ..Settlement::default()
    })
    .await
    .unwrap();
  assert_eq!(reward.amount, Amount::from_cents(2500));
}

#[tokio::test]
async fn settle_twice_is_refused() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  l.settle_reward(used.id, Settlement::default()).await.unwrap();
  let err = l
    .settle_reward(used.id, Settlement::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::AlreadySettled(_))));
  assert_eq!(l.list_rewards(ALICE.into()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_settlement_leaves_use_pending() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  // A reward already exists for the use, so the settlement insert conflicts
  // and the status update must roll back with it.
  l.create_reward(NewReward::new(ALICE, twenty(), used.id))
    .await
    .unwrap();
  let err = l
    .settle_reward(used.id, Settlement::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::RewardExists(_))));

  let still = l.find_use_by_order("pi_1".into()).await.unwrap().unwrap();
  assert_eq!(still.reward_status, UseStatus::Pending);
}

#[tokio::test]
async fn oversized_reward_validity_is_refused() {
  let (l, _) = ledger().await;
  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let used = l
    .record_use(code.code, BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();

  let err = l
    .settle_reward(used.id, Settlement { validity_days: u32::MAX, ..Settlement::default() })
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Invalid);

  let mut direct = NewReward::new(ALICE, twenty(), used.id);
  direct.validity_days = u32::MAX;
  let err = l.create_reward(direct).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Ledger(sward_core::Error::InvalidLifetime(u32::MAX))
  ));

  let still = l.find_use_by_order("pi_1".into()).await.unwrap().unwrap();
  assert_eq!(still.reward_status, UseStatus::Pending);
  assert!(l.list_rewards(ALICE.into()).await.unwrap().is_empty());
}

#[tokio::test]
async fn settle_unknown_use_errors() {
  let (l, _) = ledger().await;
  let err = l.settle_reward(99, Settlement::default()).await.unwrap_err();
  assert!(matches!(err, Error::Ledger(sward_core::Error::UseNotFound(99))));
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn statistics_cover_only_the_referrers_codes() {
  let (l, _) = ledger().await;
  let c1 = l.create_code(ALICE.into(), None).await.unwrap();
  let c2 = l.create_code(ALICE.into(), Some(30)).await.unwrap();
  let retired = l.create_code(ALICE.into(), None).await.unwrap();
  l.deactivate_code(retired.code.clone()).await.unwrap();
  let other = l.create_code(CAROL.into(), None).await.unwrap();

  let u1 = l
    .record_use(c1.code.clone(), BOB.into(), "pi_1".into(), twenty())
    .await
    .unwrap();
  let u2 = l
    .record_use(c1.code.clone(), "dave@example.com".into(), "pi_2".into(), twenty())
    .await
    .unwrap();
  l.record_use(c2.code.clone(), "erin@example.com".into(), "pi_3".into(), twenty())
    .await
    .unwrap();
  l.record_use(other.code, "frank@example.com".into(), "pi_4".into(), twenty())
    .await
    .unwrap();

  l.settle_reward(u1.id, Settlement::default()).await.unwrap();
  l.settle_reward(u2.id, Settlement::default()).await.unwrap();

  let stats = l.get_statistics(ALICE.into()).await.unwrap();
  assert_eq!(stats.total_referrals, 3);
  assert_eq!(stats.pending_rewards, 1);
  assert_eq!(stats.total_earnings, Amount::from_cents(6000));
  assert_eq!(stats.active_reward_balance, Amount::from_cents(4000));

  let mut codes: Vec<_> = stats.active_codes.iter().map(|c| c.code.clone()).collect();
  codes.sort();
  let mut expected = vec![c1.code.clone(), c2.code.clone()];
  expected.sort();
  assert_eq!(codes, expected);

  let c1_summary = stats.active_codes.iter().find(|c| c.code == c1.code).unwrap();
  assert_eq!(c1_summary.usage_count, 2);
  let c2_summary = stats.active_codes.iter().find(|c| c.code == c2.code).unwrap();
  assert_eq!(c2_summary.expires_at, Some(start() + Duration::days(30)));
}

#[tokio::test]
async fn statistics_for_stranger_are_empty() {
  let (l, _) = ledger().await;
  let stats = l.get_statistics("nobody@example.com".into()).await.unwrap();
  assert_eq!(stats.total_referrals, 0);
  assert_eq!(stats.pending_rewards, 0);
  assert_eq!(stats.total_earnings, Amount::ZERO);
  assert_eq!(stats.active_reward_balance, Amount::ZERO);
  assert!(stats.active_codes.is_empty());
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn referral_lifecycle() {
  let (l, _) = ledger().await;

  let code = l.create_code(ALICE.into(), None).await.unwrap();
  let check = l.validate_code(code.code.clone(), BOB.into()).await.unwrap();
  assert_eq!(check.referrer(), Some(ALICE));

  let used = l
    .record_use(code.code.clone(), BOB.into(), "pi_123".into(), twenty())
    .await
    .unwrap();

  let other = l.create_code(CAROL.into(), None).await.unwrap();
  for c in [code.code, other.code] {
    let check = l.validate_code(c, BOB.into()).await.unwrap();
    assert_eq!(check, rejected(Rejection::AlreadyReferred));
  }

  l.create_reward(NewReward::new(ALICE, twenty(), used.id))
    .await
    .unwrap();
  let rewards = l.get_active_rewards(ALICE.into()).await.unwrap();
  assert_eq!(rewards.len(), 1);
  assert_eq!(rewards[0].amount, twenty());
}

#[tokio::test]
async fn file_backed_ledger_persists_across_reopen() {
  let path = std::env::temp_dir().join(format!(
    "sward-test-{}-{}.db",
    std::process::id(),
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
  ));
  let config = LedgerConfig { store_path: path.clone(), require_known_referrer: false };

  let issued = {
    let l = SqliteLedger::open(&config).await.unwrap();
    l.create_code(ALICE.into(), None).await.unwrap()
  };

  let l = SqliteLedger::open(&config).await.unwrap();
  let fetched = l.get_code(issued.code.clone()).await.unwrap().unwrap();
  assert_eq!(fetched.referrer, ALICE);
  drop(l);

  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}
