//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::AuthService;
use crate::config::Config;
use crate::ledger::LedgerService;
use crate::loan_requests::LoanRequestService;
use crate::loans::LoanService;
use crate::members::MemberService;
use crate::notices::NoticeService;
use crate::reports::ReportService;
use crate::settings::SettingsService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub ledger_service: Arc<LedgerService>,
    pub member_service: Arc<MemberService>,
    pub loan_service: Arc<LoanService>,
    pub loan_request_service: Arc<LoanRequestService>,
    pub notice_service: Arc<NoticeService>,
    pub settings_service: Arc<SettingsService>,
    pub report_service: Arc<ReportService>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: &Config) -> Self {
        let settings = SettingsService::new(db_pool.clone(), config.default_credit_ceiling);
        let members = MemberService::new(db_pool.clone());

        Self {
            ledger_service: Arc::new(LedgerService::new(db_pool.clone(), settings.clone())),
            member_service: Arc::new(members.clone()),
            loan_service: Arc::new(LoanService::new(db_pool.clone())),
            loan_request_service: Arc::new(LoanRequestService::new(db_pool.clone())),
            notice_service: Arc::new(NoticeService::new(db_pool.clone())),
            settings_service: Arc::new(settings),
            report_service: Arc::new(ReportService::new(db_pool.clone())),
            auth_service: Arc::new(AuthService::new(config.jwt_secret.clone(), members)),
            db_pool,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}

impl FromRef<AppState> for Arc<LedgerService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ledger_service.clone()
    }
}

impl FromRef<AppState> for Arc<MemberService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.member_service.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<LoanRequestService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_request_service.clone()
    }
}

impl FromRef<AppState> for Arc<NoticeService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notice_service.clone()
    }
}

impl FromRef<AppState> for Arc<SettingsService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.settings_service.clone()
    }
}

impl FromRef<AppState> for Arc<ReportService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.report_service.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
