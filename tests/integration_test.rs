//! Database-backed integration tests.
//!
//! These require a running PostgreSQL configured via DATABASE_URL and are
//! gated behind `--ignored`:
//!
//!     cargo test --test integration_test -- --ignored
//!
//! Collaborator clients are constructed with dummy endpoints; no test path
//! touches storage, payments, or notification services.

use apptrial::{
    app_state::AppState,
    config::AppConfig,
    db::{self, job_queries, participation_queries, reward_queries, wallet_queries},
    jobs::{self, fraud_check, text_similarity},
    models::job::{JobPayload, JobPriority, JobStatus, NewJob},
    models::participation::ParticipationStatus,
    models::reward::RewardStatus,
    models::wallet::TransactionType,
    services::{
        notify::NotifyClient, payments::PaymentClient, phash, reports::ReportClient,
        storage::StorageClient,
    },
};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url,
        dispatch_token: "test-token".to_string(),
        storage_bucket: "test-bucket".to_string(),
        storage_endpoint: "http://127.0.0.1:9000".to_string(),
        storage_access_key: "test".to_string(),
        storage_secret_key: "test".to_string(),
        payment_api_url: "http://127.0.0.1:9001".to_string(),
        payment_api_key: "test".to_string(),
        notify_api_url: "http://127.0.0.1:9002".to_string(),
        notify_api_key: "test".to_string(),
        report_api_url: "http://127.0.0.1:9003".to_string(),
        report_api_key: "test".to_string(),
        job_batch_limit: 25,
        job_backoff_base_secs: 30,
        fraud_check_delay_secs: 10,
        reset_attempts_on_retry: false,
    }
}

async fn test_state() -> AppState {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let config = test_config(database_url);
    let storage = StorageClient::new(
        &config.storage_bucket,
        &config.storage_endpoint,
        &config.storage_access_key,
        &config.storage_secret_key,
    )
    .expect("Failed to build storage client");
    let payments = PaymentClient::new(config.payment_api_url.clone(), config.payment_api_key.clone())
        .expect("Failed to build payment client");
    let notify = NotifyClient::new(config.notify_api_url.clone(), config.notify_api_key.clone())
        .expect("Failed to build notify client");
    let reports = ReportClient::new(config.report_api_url.clone(), config.report_api_key.clone())
        .expect("Failed to build report client");

    AppState::new(pool, config, storage, payments, notify, reports)
}

async fn create_campaign(
    pool: &PgPool,
    advertiser_id: Uuid,
    cost: i64,
    reward: i64,
    daily_cap: i32,
    max_participants: i32,
) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO campaigns
            (advertiser_id, name, status, credit_cost_per_approval, reward_amount,
             daily_participation_cap, max_participants)
        VALUES ($1, 'test campaign', 'active', $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(advertiser_id)
    .bind(cost)
    .bind(reward)
    .bind(daily_cap)
    .bind(max_participants)
    .fetch_one(pool)
    .await
    .expect("Failed to create campaign");
    row.0
}

async fn funded_wallet(pool: &PgPool, advertiser_id: Uuid, amount: i64) {
    wallet_queries::get_or_create_wallet(pool, advertiser_id)
        .await
        .expect("Failed to create wallet");
    wallet_queries::topup(pool, advertiser_id, amount, "test-payment")
        .await
        .expect("Failed to top up wallet");
}

async fn make_due(pool: &PgPool, job_id: Uuid) {
    sqlx::query("UPDATE jobs SET scheduled_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await
        .expect("Failed to reschedule job");
}

#[tokio::test]
#[ignore]
#[serial]
async fn job_store_ordering_and_claiming() {
    let state = test_state().await;
    let pool = &state.db;

    // Three jobs: low priority enqueued first, then high, then medium.
    let low = job_queries::enqueue(
        pool,
        &NewJob::new(JobPayload::TextSimilarity { participation_id: Uuid::new_v4() })
            .with_priority(JobPriority::Low),
    )
    .await
    .unwrap();
    let high = job_queries::enqueue(
        pool,
        &NewJob::new(JobPayload::TextSimilarity { participation_id: Uuid::new_v4() })
            .with_priority(JobPriority::High),
    )
    .await
    .unwrap();
    let medium = job_queries::enqueue(
        pool,
        &NewJob::new(JobPayload::TextSimilarity { participation_id: Uuid::new_v4() }),
    )
    .await
    .unwrap();

    let due = job_queries::fetch_due(pool, 200).await.unwrap();
    let mine: Vec<Uuid> = due
        .iter()
        .map(|j| j.id)
        .filter(|id| [low.id, high.id, medium.id].contains(id))
        .collect();
    assert_eq!(mine, vec![high.id, medium.id, low.id]);

    // First claim wins, second claim of the same job loses.
    assert!(job_queries::claim(pool, high.id).await.unwrap());
    assert!(!job_queries::claim(pool, high.id).await.unwrap());

    let claimed = job_queries::get_job(pool, high.id).await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Processing);

    // Clean up remaining pending jobs so later batches don't execute them.
    for job in [low, medium] {
        assert!(job_queries::claim(pool, job.id).await.unwrap());
        job_queries::mark_completed(pool, job.id).await.unwrap();
    }
    job_queries::mark_completed(pool, high.id).await.unwrap();
}

#[tokio::test]
#[ignore]
#[serial]
async fn failing_job_retries_then_dead_letters() {
    let state = test_state().await;
    let pool = &state.db;

    // An image-hash job for an asset that does not exist fails every attempt.
    let job = job_queries::enqueue(
        pool,
        &NewJob::new(JobPayload::ImageHash {
            asset_id: Uuid::new_v4(),
            storage_key: "missing/asset.png".to_string(),
        })
        .with_max_attempts(3),
    )
    .await
    .unwrap();

    for attempt in 1..=3 {
        make_due(pool, job.id).await;
        jobs::run_batch(&state, 50).await.unwrap();

        let current = job_queries::get_job(pool, job.id).await.unwrap().unwrap();
        assert_eq!(current.attempts, attempt);
        assert!(current.attempts <= current.max_attempts);
        if attempt < 3 {
            assert_eq!(current.status, JobStatus::Pending);
            // Backoff pushed the schedule into the future.
            assert!(current.scheduled_at > chrono::Utc::now());
        } else {
            assert_eq!(current.status, JobStatus::Dead);
            assert!(current.failed_at.is_some());
            assert!(current.error_message.is_some());
        }
    }

    // Operator reset keeps the attempt counter by default.
    let reset = job_queries::reset_for_retry(pool, job.id, false)
        .await
        .unwrap()
        .expect("dead job should be resettable");
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.attempts, 3);
    assert!(reset.error_message.is_none());
    assert!(reset.failed_at.is_none());

    // One more failed run dead-letters it again immediately.
    make_due(pool, job.id).await;
    jobs::run_batch(&state, 50).await.unwrap();
    let again = job_queries::get_job(pool, job.id).await.unwrap().unwrap();
    assert_eq!(again.status, JobStatus::Dead);

    // With the counter reset, the job gets a fresh retry budget.
    let reset = job_queries::reset_for_retry(pool, job.id, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reset.attempts, 0);

    make_due(pool, job.id).await;
    jobs::run_batch(&state, 50).await.unwrap();
    let retried = job_queries::get_job(pool, job.id).await.unwrap().unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempts, 1);

    // Park it so later tests see a quiet queue.
    job_queries::mark_dead(pool, job.id, 3, "test cleanup").await.unwrap();
}

#[tokio::test]
#[ignore]
#[serial]
async fn ledger_balance_matches_transaction_sum() {
    let state = test_state().await;
    let pool = &state.db;
    let advertiser = Uuid::new_v4();

    funded_wallet(pool, advertiser, 10_000).await;
    wallet_queries::bonus(pool, advertiser, 500, Some("signup bonus")).await.unwrap();
    wallet_queries::adjust(pool, advertiser, -300, Some("billing correction")).await.unwrap();
    wallet_queries::refund(pool, advertiser, 300, None, Some("disputed approval")).await.unwrap();

    let wallet = wallet_queries::get_or_create_wallet(pool, advertiser).await.unwrap();
    assert_eq!(wallet.balance, 10_500);
    assert_eq!(wallet.total_topup, 10_000);

    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT amount, balance_after FROM credit_transactions WHERE wallet_id = $1 ORDER BY created_at",
    )
    .bind(wallet.id)
    .fetch_all(pool)
    .await
    .unwrap();

    let sum: i64 = rows.iter().map(|(amount, _)| amount).sum();
    assert_eq!(sum, wallet.balance);
    assert_eq!(rows.last().unwrap().1, wallet.balance);

    // An adjustment below zero must fail without writing anything.
    let err = wallet_queries::adjust(pool, advertiser, -999_999, None).await.unwrap_err();
    assert!(matches!(
        err,
        wallet_queries::LedgerError::InsufficientBalance { .. }
    ));
    let after = wallet_queries::get_or_create_wallet(pool, advertiser).await.unwrap();
    assert_eq!(after.balance, 10_500);
}

#[tokio::test]
#[ignore]
#[serial]
async fn approval_debits_once_and_conflicts_on_repeat() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    funded_wallet(pool, advertiser, 10_000).await;
    let campaign = create_campaign(pool, advertiser, 6_000, 1_500, 100, 1_000).await;

    let (first, _) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({"q1": "yes"}),
        "works well on my device",
        &["proof/a.png".to_string()],
    )
    .await
    .unwrap();

    let reviewer = Uuid::new_v4();
    let outcome = participation_queries::approve(pool, first.id, reviewer).await.unwrap();

    assert_eq!(outcome.participation.status, ParticipationStatus::Approved);
    assert_eq!(outcome.wallet_balance, 4_000);
    assert_eq!(outcome.reward.status, RewardStatus::Requested);
    assert_eq!(outcome.reward.amount, 1_500);

    let tx_row: (String, i64, i64) = sqlx::query_as(
        r#"
        SELECT tx_type, amount, balance_after
        FROM credit_transactions
        WHERE ref_id = $1
        "#,
    )
    .bind(first.id)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(tx_row.0, TransactionType::Consume.to_string());
    assert_eq!(tx_row.1, -6_000);
    assert_eq!(tx_row.2, 4_000);

    // Approving again is a status conflict, not a double debit.
    let err = participation_queries::approve(pool, first.id, reviewer).await.unwrap_err();
    assert!(matches!(
        err,
        participation_queries::ReviewError::StatusConflict { .. }
    ));

    // A second participation cannot be funded from the remaining 4,000.
    let (second, _) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({}),
        "another tester's feedback",
        &["proof/b.png".to_string()],
    )
    .await
    .unwrap();

    let err = participation_queries::approve(pool, second.id, reviewer).await.unwrap_err();
    match err {
        participation_queries::ReviewError::Ledger(
            wallet_queries::LedgerError::InsufficientBalance { balance, required },
        ) => {
            assert_eq!(balance, 4_000);
            assert_eq!(required, 6_000);
        }
        other => panic!("expected insufficient balance, got {other:?}"),
    }

    let wallet = wallet_queries::get_or_create_wallet(pool, advertiser).await.unwrap();
    assert_eq!(wallet.balance, 4_000);

    // The failed approval wrote nothing: no reward, status unchanged.
    let second_now = participation_queries::get_participation(pool, second.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second_now.status, ParticipationStatus::Submitted);
}

#[tokio::test]
#[ignore]
#[serial]
async fn concurrent_approvals_exactly_one_succeeds() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    funded_wallet(pool, advertiser, 50_000).await;
    let campaign = create_campaign(pool, advertiser, 6_000, 1_000, 100, 1_000).await;

    let (participation, _) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({}),
        "concurrent approval target",
        &["proof/c.png".to_string()],
    )
    .await
    .unwrap();

    let (a, b) = futures::join!(
        participation_queries::approve(pool, participation.id, Uuid::new_v4()),
        participation_queries::approve(pool, participation.id, Uuid::new_v4()),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent approval may win");

    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser.unwrap_err(),
        participation_queries::ReviewError::StatusConflict { .. }
    ));

    // The wallet saw exactly one consume.
    let wallet = wallet_queries::get_or_create_wallet(pool, advertiser).await.unwrap();
    assert_eq!(wallet.balance, 44_000);
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM credit_transactions WHERE wallet_id = $1 AND tx_type = 'consume'",
    )
    .bind(wallet.id)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore]
#[serial]
async fn reject_sets_reason_without_touching_money() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    funded_wallet(pool, advertiser, 10_000).await;
    let campaign = create_campaign(pool, advertiser, 6_000, 1_000, 100, 1_000).await;

    let (participation, _) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({}),
        "screenshot is blurry on purpose",
        &["proof/d.png".to_string()],
    )
    .await
    .unwrap();

    // Route it to manual review first, as the pipeline would.
    sqlx::query("UPDATE participations SET status = 'manual_review' WHERE id = $1")
        .bind(participation.id)
        .execute(pool)
        .await
        .unwrap();

    let rejected = participation_queries::reject(
        pool,
        participation.id,
        Uuid::new_v4(),
        "blurry screenshot",
    )
    .await
    .unwrap();

    assert_eq!(rejected.status, ParticipationStatus::Rejected);
    assert_eq!(rejected.reject_reason.as_deref(), Some("blurry screenshot"));

    let wallet = wallet_queries::get_or_create_wallet(pool, advertiser).await.unwrap();
    assert_eq!(wallet.balance, 10_000);

    // Terminal: a later approval attempt conflicts.
    let err = participation_queries::approve(pool, participation.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        participation_queries::ReviewError::StatusConflict { .. }
    ));
}

#[tokio::test]
#[ignore]
#[serial]
async fn fraud_pipeline_auto_rejects_duplicate_submissions() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    funded_wallet(pool, advertiser, 100_000).await;
    let campaign = create_campaign(pool, advertiser, 6_000, 1_000, 100, 1_000).await;

    let feedback = "The login screen froze twice before I could finish the signup questionnaire";

    let (original, original_assets) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({}),
        feedback,
        &["proof/original.png".to_string()],
    )
    .await
    .unwrap();

    let (copycat, copycat_assets) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({}),
        // Same text with a trivial tweak.
        "The login screen froze twice before I could finish the signup questionnaire!",
        &["proof/copycat.png".to_string()],
    )
    .await
    .unwrap();

    // Both "screenshots" carry the same perceptual hash, as the image_hash
    // job would compute for a re-uploaded image.
    let hash = phash::to_stored(0xABCD_1234_5678_9EF0);
    participation_queries::set_asset_hash(pool, original_assets[0].id, hash)
        .await
        .unwrap();
    participation_queries::set_asset_hash(pool, copycat_assets[0].id, hash)
        .await
        .unwrap();

    text_similarity::run(&state, copycat.id).await.unwrap();
    fraud_check::run(&state, copycat.id).await.unwrap();

    let evaluated = participation_queries::get_participation(pool, copycat.id)
        .await
        .unwrap()
        .unwrap();

    // duplicate image (40) + duplicate text (30) >= 70
    assert_eq!(evaluated.status, ParticipationStatus::AutoRejected);
    assert!(evaluated.fraud_score.unwrap() >= 70);
    assert!(!evaluated.fraud_reasons.is_empty());

    let signals = participation_queries::fraud_signals_for(pool, copycat.id).await.unwrap();
    assert!(signals.len() >= 2, "both duplicate signals should be recorded");

    // Terminal: the reviewer cannot approve an auto-rejected submission.
    let err = participation_queries::approve(pool, copycat.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        participation_queries::ReviewError::StatusConflict { .. }
    ));

    // The original, evaluated against an otherwise clean campaign, passes to
    // manual review at most (its own assets now collide with the copycat's).
    text_similarity::run(&state, original.id).await.unwrap();
    fraud_check::run(&state, original.id).await.unwrap();
    let original_now = participation_queries::get_participation(pool, original.id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(original_now.status, ParticipationStatus::Submitted);
}

#[tokio::test]
#[ignore]
#[serial]
async fn clean_submission_routes_to_pending_review() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    let campaign = create_campaign(pool, advertiser, 1_000, 500, 100, 1_000).await;

    // An established tester: several old, approved participations.
    let user = Uuid::new_v4();
    let old_campaign = create_campaign(pool, advertiser, 1_000, 500, 100, 1_000).await;
    sqlx::query(
        r#"
        INSERT INTO participations (campaign_id, user_id, status, feedback_text, created_at)
        VALUES ($1, $2, 'paid', 'old feedback about a different app entirely', NOW() - INTERVAL '60 days')
        "#,
    )
    .bind(old_campaign)
    .bind(user)
    .execute(pool)
    .await
    .unwrap();

    let (participation, assets) = participation_queries::create_participation(
        pool,
        campaign,
        user,
        serde_json::json!({"q1": "no"}),
        "Checkout worked fine but the receipt email never arrived in my inbox",
        &["proof/clean.png".to_string()],
    )
    .await
    .unwrap();

    participation_queries::set_asset_hash(pool, assets[0].id, phash::to_stored(0x0102_0304_0506_0708))
        .await
        .unwrap();

    text_similarity::run(&state, participation.id).await.unwrap();
    fraud_check::run(&state, participation.id).await.unwrap();

    let evaluated = participation_queries::get_participation(pool, participation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(evaluated.status, ParticipationStatus::PendingReview);
    assert_eq!(evaluated.fraud_score, Some(0));
}

#[tokio::test]
#[ignore]
#[serial]
async fn reward_issuance_finalizes_participation() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    funded_wallet(pool, advertiser, 20_000).await;
    let campaign = create_campaign(pool, advertiser, 6_000, 1_500, 100, 1_000).await;

    let (participation, _) = participation_queries::create_participation(
        pool,
        campaign,
        Uuid::new_v4(),
        serde_json::json!({}),
        "reward issuance target",
        &["proof/e.png".to_string()],
    )
    .await
    .unwrap();

    let outcome = participation_queries::approve(pool, participation.id, Uuid::new_v4())
        .await
        .unwrap();

    let reward = reward_queries::mark_sent(pool, outcome.reward.id, "bank_transfer", "wire-123")
        .await
        .unwrap();
    assert_eq!(reward.status, RewardStatus::Sent);

    let paid = participation_queries::get_participation(pool, participation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paid.status, ParticipationStatus::Paid);

    // A reward leaves requested exactly once.
    let err = reward_queries::mark_sent(pool, outcome.reward.id, "bank_transfer", "wire-124")
        .await
        .unwrap_err();
    assert!(matches!(err, reward_queries::RewardError::StatusConflict { .. }));
    let err = reward_queries::mark_failed(pool, outcome.reward.id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, reward_queries::RewardError::StatusConflict { .. }));
}

#[tokio::test]
#[ignore]
#[serial]
async fn duplicate_submission_is_rejected_by_constraint() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    let campaign = create_campaign(pool, advertiser, 1_000, 500, 100, 1_000).await;
    let user = Uuid::new_v4();

    participation_queries::create_participation(
        pool,
        campaign,
        user,
        serde_json::json!({}),
        "first submission",
        &["proof/f.png".to_string()],
    )
    .await
    .unwrap();

    let err = participation_queries::create_participation(
        pool,
        campaign,
        user,
        serde_json::json!({}),
        "second submission, same tester",
        &["proof/g.png".to_string()],
    )
    .await
    .unwrap_err();

    assert!(participation_queries::is_duplicate_participation(&err));
}

#[tokio::test]
#[ignore]
#[serial]
async fn daily_velocity_flags_manual_review() {
    let state = test_state().await;
    let pool = &state.db;

    let advertiser = Uuid::new_v4();
    // Tiny daily cap so one user's activity is already "high velocity".
    let campaign = create_campaign(pool, advertiser, 1_000, 500, 4, 1_000).await;
    let user = Uuid::new_v4();

    // Three other submissions today by the same user, elsewhere.
    for _ in 0..3 {
        let other = create_campaign(pool, advertiser, 1_000, 500, 100, 1_000).await;
        participation_queries::create_participation(
            pool,
            other,
            user,
            serde_json::json!({}),
            "",
            &[format!("proof/{}.png", Uuid::new_v4())],
        )
        .await
        .unwrap();
    }

    let (participation, assets) = participation_queries::create_participation(
        pool,
        campaign,
        user,
        serde_json::json!({}),
        "",
        &["proof/velocity.png".to_string()],
    )
    .await
    .unwrap();
    participation_queries::set_asset_hash(pool, assets[0].id, phash::to_stored(0x1111_2222_3333_4444))
        .await
        .unwrap();

    fraud_check::run(&state, participation.id).await.unwrap();

    let evaluated = participation_queries::get_participation(pool, participation.id)
        .await
        .unwrap()
        .unwrap();
    // Velocity (4/4 today) plus a first-day account: signals but no auto-reject.
    assert_eq!(evaluated.status, ParticipationStatus::ManualReview);
    let score = evaluated.fraud_score.unwrap();
    assert!(score > 0 && score < 70);
}
