//! Cash-bill generation
//!
//! A cash bill tells each member what is due this month. Figures are derived
//! from the member's open loans and profile, with the same available-credit
//! rule as the monthly ledger.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::ledger::{available_loan_amount, LedgerError};
use crate::loans::Loan;
use crate::members::Member;
use crate::period::PeriodKey;
use crate::settings::SystemSettings;

#[derive(Debug, Deserialize)]
pub struct CashBillRequest {
    pub period_key: Option<PeriodKey>,
    pub member_ids: Option<Vec<Uuid>>,
}

/// Financial position a bill is computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashBillSnapshot {
    pub member_code: String,
    pub full_name: String,
    pub loan_balance: i64,
    pub monthly_subscription: i64,
    pub principal_installment: i64,
    pub outstanding_fine: i64,
}

impl CashBillSnapshot {
    pub fn from_member(member: &Member, open_loans: &[Loan]) -> Self {
        Self {
            member_code: member.member_code.clone(),
            full_name: member.full_name.clone(),
            loan_balance: open_loans.iter().map(|l| l.remaining_balance).sum(),
            monthly_subscription: member.monthly_subscription,
            principal_installment: open_loans.iter().map(Loan::installment_due).sum(),
            outstanding_fine: member.outstanding_fine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashBill {
    pub member_code: String,
    pub full_name: String,
    pub period_key: PeriodKey,
    pub loan_balance: i64,
    pub monthly_subscription: i64,
    pub interest: i64,
    pub principal_installment: i64,
    pub fine: i64,
    pub total_payable: i64,
    pub available_loan_amount: i64,
}

impl CashBill {
    pub fn compute(
        snapshot: &CashBillSnapshot,
        period_key: PeriodKey,
        settings: &SystemSettings,
    ) -> Result<Self, LedgerError> {
        let interest = monthly_interest(snapshot.loan_balance, settings.cash_bill_interest_bps)?;
        let total_payable = snapshot
            .monthly_subscription
            .checked_add(interest)
            .and_then(|v| v.checked_add(snapshot.principal_installment))
            .and_then(|v| v.checked_add(snapshot.outstanding_fine))
            .ok_or(LedgerError::Overflow)?;

        Ok(Self {
            member_code: snapshot.member_code.clone(),
            full_name: snapshot.full_name.clone(),
            period_key,
            loan_balance: snapshot.loan_balance,
            monthly_subscription: snapshot.monthly_subscription,
            interest,
            principal_installment: snapshot.principal_installment,
            fine: snapshot.outstanding_fine,
            total_payable,
            available_loan_amount: available_loan_amount(
                settings.credit_ceiling,
                snapshot.loan_balance,
            )?,
        })
    }
}

/// `balance * bps / 10000`, rounded half up. Balances at or below zero accrue nothing.
pub fn monthly_interest(balance: i64, rate_bps: i32) -> Result<i64, LedgerError> {
    if balance <= 0 || rate_bps <= 0 {
        return Ok(0);
    }
    let scaled = (balance as i128) * (rate_bps as i128) + 5_000;
    i64::try_from(scaled / 10_000).map_err(|_| LedgerError::Overflow)
}

/// Two-column (label, value) CSV, one block per member separated by a blank row
pub fn render_csv(bills: &[CashBill], interest_bps: i32) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let interest_label = format!(
        "Interest ({}.{:02}%)",
        interest_bps / 100,
        interest_bps % 100
    );

    for (i, bill) in bills.iter().enumerate() {
        if i > 0 {
            writer.write_record(["", ""])?;
        }
        let rows: [(&str, String); 10] = [
            ("Member Code", bill.member_code.clone()),
            ("Member Name", bill.full_name.clone()),
            ("Period", bill.period_key.to_string()),
            ("Loan Balance", bill.loan_balance.to_string()),
            ("Subscription", bill.monthly_subscription.to_string()),
            (interest_label.as_str(), bill.interest.to_string()),
            ("Principal Installment", bill.principal_installment.to_string()),
            ("Fine", bill.fine.to_string()),
            ("Total Payable", bill.total_payable.to_string()),
            ("Available Loan", bill.available_loan_amount.to_string()),
        ];
        for (label, value) in rows.iter() {
            writer.write_record([*label, value.as_str()])?;
        }
    }

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[derive(Clone)]
pub struct ReportService {
    db_pool: PgPool,
}

impl ReportService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Bills for the selected (or all active) members
    pub async fn cash_bills(
        &self,
        period_key: PeriodKey,
        member_ids: Option<&[Uuid]>,
        settings: &SystemSettings,
    ) -> Result<Vec<CashBill>, ApiError> {
        let mut query_builder =
            sqlx::QueryBuilder::new("SELECT * FROM profiles WHERE role <> 'inactive'");
        if let Some(ids) = member_ids {
            query_builder.push(" AND id = ANY(");
            query_builder.push_bind(ids.to_vec());
            query_builder.push(")");
        }
        query_builder.push(" ORDER BY member_code");

        let members = query_builder
            .build_query_as::<Member>()
            .fetch_all(&self.db_pool)
            .await?;

        let member_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE member_id = ANY($1) AND status IN ('approved', 'active')
            ORDER BY disbursed_on
            "#,
        )
        .bind(&member_ids)
        .fetch_all(&self.db_pool)
        .await?;

        let mut loans_by_member: HashMap<Uuid, Vec<Loan>> = HashMap::new();
        for loan in loans {
            loans_by_member.entry(loan.member_id).or_default().push(loan);
        }

        let bills = members
            .iter()
            .map(|member| {
                let open_loans = loans_by_member
                    .get(&member.id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let snapshot = CashBillSnapshot::from_member(member, open_loans);
                CashBill::compute(&snapshot, period_key, settings)
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(period_key = %period_key, bills = bills.len(), "Cash bills generated");

        Ok(bills)
    }
}
