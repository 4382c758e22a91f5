//! Ledger behaviour against a real Postgres database
//!
//! Run with `TEST_DATABASE_URL` pointing at a scratch database and
//! `cargo test -- --ignored`.

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use sqlx::PgPool;
    use std::sync::OnceLock;
    use tokio::sync::{Mutex, MutexGuard};
    use uuid::Uuid;

    use circle_ledger_server::db;
    use circle_ledger_server::error::ApiError;
    use circle_ledger_server::ledger::{
        BulkUpdateRequest, LedgerService, MonthlyLoanRecord, RecordPatch, RecordStatus,
        UpdateRecordRequest, DEFAULT_CREDIT_CEILING,
    };
    use circle_ledger_server::loan_requests::{
        ApproveLoanRequest, LoanRequestService, LoanRequestStatus, RejectLoanRequest,
        SubmitLoanRequest,
    };
    use circle_ledger_server::loans::{
        CreateLoanRequest, DisbursementKind, Loan, LoanService, RecordPaymentRequest,
        TopUpRequest,
    };
    use circle_ledger_server::members::{CreateMemberRequest, Member, MemberRole, MemberService};
    use circle_ledger_server::period::PeriodKey;
    use circle_ledger_server::settings::SettingsService;

    // Month initialization and refresh touch every member, so tests take turns.
    async fn db_lock() -> MutexGuard<'static, ()> {
        static DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        DB_LOCK.get_or_init(|| Mutex::new(())).lock().await
    }

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/circle_ledger_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        db::run_migrations(&pool).await.expect("Failed to migrate");
        pool
    }

    fn ledger(pool: &PgPool) -> LedgerService {
        LedgerService::new(
            pool.clone(),
            SettingsService::new(pool.clone(), DEFAULT_CREDIT_CEILING),
        )
    }

    async fn create_member(pool: &PgPool, role: MemberRole) -> Member {
        MemberService::new(pool.clone())
            .create_member(
                CreateMemberRequest {
                    id: Uuid::new_v4(),
                    full_name: "Test Member".to_string(),
                    email: None,
                    phone: None,
                    role: Some(role),
                    member_code: None,
                    monthly_subscription: Some(1_000),
                    outstanding_fine: None,
                },
                1_000,
            )
            .await
            .expect("Failed to create member")
    }

    /// A month no earlier test run is likely to have used
    fn fresh_period() -> PeriodKey {
        let bytes = Uuid::new_v4().into_bytes();
        let year = 3000 + (u16::from_be_bytes([bytes[0], bytes[1]]) % 6000) as i32;
        PeriodKey::new(year, 2).unwrap()
    }

    /// Payments cannot be future-dated, so event tests run in the current month
    fn current_period() -> PeriodKey {
        PeriodKey::from_date(Utc::now().date_naive())
    }

    /// A date in the month before the current one
    fn last_month() -> NaiveDate {
        let previous = current_period().previous();
        NaiveDate::from_ymd_opt(previous.year(), previous.month(), 15).unwrap()
    }

    async fn member_record(
        ledger: &LedgerService,
        member_id: Uuid,
        period: PeriodKey,
    ) -> MonthlyLoanRecord {
        ledger
            .find_member_record(member_id, period)
            .await
            .unwrap()
            .expect("member should have a record for the period")
    }

    async fn issue(
        loans: &LoanService,
        member_id: Uuid,
        amount: i64,
        disbursed_on: Option<NaiveDate>,
        admin_id: Uuid,
    ) -> Result<Loan, ApiError> {
        loans
            .issue_loan(
                CreateLoanRequest {
                    member_id,
                    principal_amount: amount,
                    interest_rate: 100,
                    emi_amount: 1_000,
                    disbursed_on,
                },
                admin_id,
            )
            .await
    }

    fn payment(loan_id: Uuid, principal: i64, interest: i64, penalty: i64) -> RecordPaymentRequest {
        RecordPaymentRequest {
            loan_id,
            amount: principal + interest + penalty,
            principal_component: principal,
            interest_component: interest,
            penalty_component: penalty,
            subscription_component: 0,
            payment_date: Utc::now().date_naive(),
            notes: None,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_initialize_month_is_idempotent() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let retired = create_member(&pool, MemberRole::Inactive).await;
        let period = fresh_period();

        let first = ledger.initialize_month(period, admin.id).await.unwrap();
        assert!(first.records_created >= 2);

        let second = ledger.initialize_month(period, admin.id).await.unwrap();
        assert_eq!(second.records_created, 0);

        assert!(ledger
            .find_member_record(member.id, period)
            .await
            .unwrap()
            .is_some());
        assert!(ledger
            .find_member_record(retired.id, period)
            .await
            .unwrap()
            .is_none());

        let summary = ledger.period_summary(period).await.unwrap();
        assert_eq!(summary.record_count as u64, first.records_created);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_finalized_closing_seeds_next_opening() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let february = fresh_period();

        ledger.initialize_month(february, admin.id).await.unwrap();
        let record = ledger
            .find_member_record(member.id, february)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.opening_outstanding, 0);

        let updated = ledger
            .update_record(
                record.id,
                UpdateRecordRequest {
                    expected_version: record.version,
                    changes: RecordPatch {
                        new_loan_taken: Some(5_000),
                        ..Default::default()
                    },
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(updated.closing_outstanding, 5_000);
        ledger.finalize_record(record.id, admin.id).await.unwrap();

        let march = PeriodKey::new(february.year(), 3).unwrap();
        ledger.initialize_month(march, admin.id).await.unwrap();
        let next = ledger
            .find_member_record(member.id, march)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.opening_outstanding, 5_000);
        assert_eq!(next.status, RecordStatus::Draft);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_finalized_record_cannot_be_edited() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let period = fresh_period();

        ledger.initialize_month(period, admin.id).await.unwrap();
        let record = ledger
            .find_member_record(member.id, period)
            .await
            .unwrap()
            .unwrap();
        let finalized = ledger.finalize_record(record.id, admin.id).await.unwrap();
        assert_eq!(finalized.status, RecordStatus::Finalized);

        let result = ledger
            .update_record(
                record.id,
                UpdateRecordRequest {
                    expected_version: finalized.version,
                    changes: RecordPatch {
                        principal_paid: Some(500),
                        ..Default::default()
                    },
                },
                admin.id,
            )
            .await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));

        let again = ledger.finalize_record(record.id, admin.id).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));

        let stored = ledger.get_record(record.id).await.unwrap();
        assert_eq!(stored, finalized);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_stale_version_is_a_conflict() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let period = fresh_period();

        ledger.initialize_month(period, admin.id).await.unwrap();
        let record = ledger
            .find_member_record(member.id, period)
            .await
            .unwrap()
            .unwrap();

        let edit = |principal: i64| UpdateRecordRequest {
            expected_version: record.version,
            changes: RecordPatch {
                principal_paid: Some(principal),
                ..Default::default()
            },
        };

        let first = ledger.update_record(record.id, edit(100), admin.id).await.unwrap();
        assert_eq!(first.version, record.version + 1);

        let second = ledger.update_record(record.id, edit(200), admin.id).await;
        assert!(matches!(second, Err(ApiError::Conflict(_))));

        let stored = ledger.get_record(record.id).await.unwrap();
        assert_eq!(stored.principal_paid, 100);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_second_payment_in_same_month_is_rejected() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let loans = LoanService::new(pool.clone());
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;

        let loan = issue(&loans, member.id, 10_000, None, admin.id).await.unwrap();
        let installment = || payment(loan.id, 1_000, 100, 0);

        loans.record_payment(installment(), admin.id).await.unwrap();
        match loans.record_payment(installment(), admin.id).await {
            Err(ApiError::Conflict(message)) => assert!(message.contains("once per month")),
            other => panic!("expected a conflict, got {:?}", other.map(|p| p.id)),
        }

        let reloaded = loans.get_loan(loan.id).await.unwrap();
        assert_eq!(reloaded.remaining_balance, 9_000);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_overpaid_month_seeds_negative_opening() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let february = fresh_period();

        ledger.initialize_month(february, admin.id).await.unwrap();
        let record = member_record(&ledger, member.id, february).await;
        let overpaid = ledger
            .update_record(
                record.id,
                UpdateRecordRequest {
                    expected_version: record.version,
                    changes: RecordPatch {
                        principal_paid: Some(1_500),
                        ..Default::default()
                    },
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(overpaid.closing_outstanding, -1_500);
        ledger.finalize_record(record.id, admin.id).await.unwrap();

        let march = PeriodKey::new(february.year(), 3).unwrap();
        let created = ledger.initialize_month(march, admin.id).await.unwrap();
        assert!(created.records_created >= 2);

        let next = member_record(&ledger, member.id, march).await;
        assert_eq!(next.opening_outstanding, -1_500);
        assert_eq!(next.closing_outstanding, -1_500);
        assert_eq!(next.available_loan_amount, next.credit_limit + 1_500);

        // The carried-forward record stays editable
        let edited = ledger
            .update_record(
                next.id,
                UpdateRecordRequest {
                    expected_version: next.version,
                    changes: RecordPatch {
                        interest_paid: Some(10),
                        ..Default::default()
                    },
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(edited.closing_outstanding, -1_500);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_refresh_rederives_events_and_skips_finalized() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let loans = LoanService::new(pool.clone());
        let admin = create_member(&pool, MemberRole::Admin).await;
        let active = create_member(&pool, MemberRole::Member).await;
        let closed = create_member(&pool, MemberRole::Member).await;
        let period = current_period();

        let loan = issue(&loans, active.id, 10_000, None, admin.id).await.unwrap();
        loans
            .record_payment(payment(loan.id, 1_000, 100, 50), admin.id)
            .await
            .unwrap();

        let other_loan = issue(&loans, closed.id, 8_000, None, admin.id).await.unwrap();
        loans
            .record_payment(payment(other_loan.id, 500, 80, 0), admin.id)
            .await
            .unwrap();

        ledger.initialize_month(period, admin.id).await.unwrap();
        let before = member_record(&ledger, closed.id, period).await;
        let finalized = ledger.finalize_record(before.id, admin.id).await.unwrap();

        let refreshed = ledger.refresh_period(period).await.unwrap();
        assert!(refreshed.records_refreshed >= 1);

        let record = member_record(&ledger, active.id, period).await;
        assert_eq!(record.new_loan_taken, 10_000);
        assert_eq!(record.principal_paid, 1_000);
        assert_eq!(record.interest_paid, 100);
        assert_eq!(record.penalty, 50);
        assert_eq!(record.monthly_subscription, 1_000);
        assert_eq!(record.closing_outstanding, 9_000);
        assert_eq!(record.total_monthly_income, 1_000 + 100 + 1_000 + 50);
        assert_eq!(record.installment_income, 1_100);

        let untouched = member_record(&ledger, closed.id, period).await;
        assert_eq!(untouched, finalized);
        assert_eq!(untouched.new_loan_taken, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_top_up_feeds_new_loan_taken() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let loans = LoanService::new(pool.clone());
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let period = current_period();

        let loan = issue(&loans, member.id, 6_000, Some(last_month()), admin.id)
            .await
            .unwrap();
        let topped = loans
            .top_up(
                loan.id,
                TopUpRequest {
                    amount: 2_000,
                    emi_amount: None,
                    disbursed_on: None,
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(topped.principal_amount, 8_000);
        assert_eq!(topped.remaining_balance, 8_000);

        let disbursements = loans.list_disbursements(loan.id).await.unwrap();
        assert_eq!(disbursements.len(), 2);
        assert!(disbursements
            .iter()
            .any(|d| d.kind == DisbursementKind::TopUp && d.period_key == period.to_string()));

        ledger.initialize_month(period, admin.id).await.unwrap();
        ledger.refresh_period(period).await.unwrap();

        let record = member_record(&ledger, member.id, period).await;
        assert_eq!(record.new_loan_taken, 2_000);
        assert_eq!(
            record.closing_outstanding,
            record.opening_outstanding + 2_000
        );
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_bulk_update_skips_finalized_and_applies_credit_limit() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let admin = create_member(&pool, MemberRole::Admin).await;
        let borrower = create_member(&pool, MemberRole::Member).await;
        let closed = create_member(&pool, MemberRole::Member).await;
        let period = fresh_period();

        ledger.initialize_month(period, admin.id).await.unwrap();
        let record = member_record(&ledger, borrower.id, period).await;
        ledger
            .update_record(
                record.id,
                UpdateRecordRequest {
                    expected_version: record.version,
                    changes: RecordPatch {
                        new_loan_taken: Some(30_000),
                        ..Default::default()
                    },
                },
                admin.id,
            )
            .await
            .unwrap();

        let locked = member_record(&ledger, closed.id, period).await;
        let finalized = ledger.finalize_record(locked.id, admin.id).await.unwrap();

        let response = ledger
            .bulk_update(
                BulkUpdateRequest {
                    period_key: period,
                    member_ids: Some(vec![borrower.id, closed.id]),
                    monthly_subscription: Some(2_500),
                    credit_limit: Some(100_000),
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(response.records_updated, 1);
        assert_eq!(response.records_skipped_finalized, 1);

        let updated = member_record(&ledger, borrower.id, period).await;
        assert_eq!(updated.monthly_subscription, 2_500);
        assert_eq!(updated.credit_limit, 100_000);
        assert_eq!(updated.closing_outstanding, 30_000);
        assert_eq!(updated.available_loan_amount, 70_000);
        assert_eq!(updated.total_monthly_income, 2_500);

        let untouched = member_record(&ledger, closed.id, period).await;
        assert_eq!(untouched, finalized);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_approve_opens_loan_and_reject_closes_request() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let loans = LoanService::new(pool.clone());
        let requests = LoanRequestService::new(pool.clone());
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;

        let submitted = requests
            .submit(
                member.id,
                SubmitLoanRequest {
                    amount: 5_000,
                    purpose: "School fees".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(submitted.status, LoanRequestStatus::Pending);

        let approved = requests
            .approve(
                submitted.id,
                ApproveLoanRequest {
                    approved_amount: Some(4_000),
                    interest_rate: 100,
                    emi_amount: 500,
                    admin_remark: Some("Reduced".to_string()),
                    disbursed_on: None,
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(approved.request.status, LoanRequestStatus::Approved);
        assert_eq!(approved.request.approved_amount, Some(4_000));
        assert_eq!(approved.request.loan_id, Some(approved.loan.id));
        assert_eq!(approved.loan.principal_amount, 4_000);
        assert_eq!(approved.loan.remaining_balance, 4_000);
        assert_eq!(approved.loan.request_id, Some(submitted.id));

        let disbursements = loans.list_disbursements(approved.loan.id).await.unwrap();
        assert_eq!(disbursements.len(), 1);
        assert_eq!(disbursements[0].kind, DisbursementKind::Initial);
        assert_eq!(disbursements[0].amount, 4_000);

        let second = requests
            .submit(
                member.id,
                SubmitLoanRequest {
                    amount: 2_000,
                    purpose: "Repairs".to_string(),
                },
            )
            .await
            .unwrap();
        let rejected = requests
            .reject(
                second.id,
                RejectLoanRequest {
                    admin_remark: Some("Too soon".to_string()),
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, LoanRequestStatus::Rejected);
        assert_eq!(rejected.admin_remark.as_deref(), Some("Too soon"));
        assert_eq!(rejected.loan_id, None);

        let late_approval = requests
            .approve(
                second.id,
                ApproveLoanRequest {
                    approved_amount: None,
                    interest_rate: 100,
                    emi_amount: 500,
                    admin_remark: None,
                    disbursed_on: None,
                },
                admin.id,
            )
            .await;
        assert!(matches!(late_approval, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_finalized_period_refuses_payments_and_disbursements() {
        let _guard = db_lock().await;
        let pool = setup_test_db().await;
        let ledger = ledger(&pool);
        let loans = LoanService::new(pool.clone());
        let admin = create_member(&pool, MemberRole::Admin).await;
        let member = create_member(&pool, MemberRole::Member).await;
        let period = current_period();

        let loan = issue(&loans, member.id, 10_000, Some(last_month()), admin.id)
            .await
            .unwrap();

        ledger.initialize_month(period, admin.id).await.unwrap();
        let record = member_record(&ledger, member.id, period).await;
        let finalized = ledger.finalize_record(record.id, admin.id).await.unwrap();

        let expected = format!("Period {} is finalized", period);
        match loans.record_payment(payment(loan.id, 1_000, 100, 0), admin.id).await {
            Err(ApiError::Conflict(message)) => assert!(message.contains(&expected)),
            other => panic!("expected a conflict, got {:?}", other.map(|p| p.id)),
        }

        let top_up = loans
            .top_up(
                loan.id,
                TopUpRequest {
                    amount: 1_000,
                    emi_amount: None,
                    disbursed_on: None,
                },
                admin.id,
            )
            .await;
        assert!(matches!(top_up, Err(ApiError::Conflict(_))));

        let second_loan = issue(&loans, member.id, 3_000, None, admin.id).await;
        assert!(matches!(second_loan, Err(ApiError::Conflict(_))));

        let reloaded = loans.get_loan(loan.id).await.unwrap();
        assert_eq!(reloaded.principal_amount, 10_000);
        assert_eq!(reloaded.remaining_balance, 10_000);
        assert_eq!(loans.list_disbursements(loan.id).await.unwrap().len(), 1);
        assert_eq!(member_record(&ledger, member.id, period).await, finalized);

        // Back-dated events into a month that is still open are accepted
        loans
            .top_up(
                loan.id,
                TopUpRequest {
                    amount: 1_000,
                    emi_amount: None,
                    disbursed_on: Some(last_month()),
                },
                admin.id,
            )
            .await
            .unwrap();
    }
}
