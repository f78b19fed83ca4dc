use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    money, Booking, PaymentStatus, Transaction, TransactionStatus, TransactionType,
};

/// Amounts are rupee values with at most two fractional digits.
pub fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    if amount.round_dp(2) != amount {
        return Err(AppError::Validation(
            "amount must have at most two fractional digits".to_string(),
        ));
    }
    Ok(())
}

/// Appends one ledger row. The ledger is append-only: apart from a single
/// settlement, rows are never touched again.
#[allow(clippy::too_many_arguments)]
pub fn record_transaction(
    conn: &Connection,
    user_id: &str,
    tx_type: TransactionType,
    amount: Decimal,
    booking_id: Option<String>,
    bank_details: Option<String>,
    status: TransactionStatus,
    now: &NaiveDateTime,
) -> Result<Transaction, AppError> {
    validate_amount(amount)?;

    let tx = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        booking_id,
        tx_type,
        amount: money(amount),
        status,
        bank_details,
        created_at: *now,
        settled_at: match status {
            TransactionStatus::Pending => None,
            _ => Some(*now),
        },
    };
    queries::insert_transaction(conn, &tx)?;
    Ok(tx)
}

/// Derived wallet balance: settled credits minus settled withdrawals.
/// Never persisted, so it cannot drift from the ledger.
pub fn compute_balance(conn: &Connection, user_id: &str) -> Result<Decimal, AppError> {
    let rows = queries::wallet_rows(conn, user_id)?;
    let balance = rows
        .iter()
        .filter(|(_, status, _)| *status == TransactionStatus::Success)
        .fold(Decimal::ZERO, |acc, (tx_type, _, amount)| {
            if tx_type.is_wallet_credit() {
                acc + amount
            } else if *tx_type == TransactionType::Withdrawal {
                acc - amount
            } else {
                acc
            }
        });
    Ok(money(balance))
}

/// Balance a new withdrawal may draw on: the settled balance minus
/// withdrawals still pending, so back-to-back requests cannot jointly
/// overdraw while the first awaits settlement.
fn available_for_withdrawal(conn: &Connection, user_id: &str) -> Result<Decimal, AppError> {
    let rows = queries::wallet_rows(conn, user_id)?;
    let pending_withdrawals = rows
        .iter()
        .filter(|(tx_type, status, _)| {
            *tx_type == TransactionType::Withdrawal && *status == TransactionStatus::Pending
        })
        .fold(Decimal::ZERO, |acc, (_, _, amount)| acc + amount);

    Ok(compute_balance(conn, user_id)? - pending_withdrawals)
}

pub fn request_withdrawal(
    conn: &Connection,
    user_id: &str,
    amount: Decimal,
    bank_details: String,
) -> Result<Transaction, AppError> {
    let now = Utc::now().naive_utc();
    request_withdrawal_at(conn, user_id, amount, bank_details, &now)
}

pub fn request_withdrawal_at(
    conn: &Connection,
    user_id: &str,
    amount: Decimal,
    bank_details: String,
    now: &NaiveDateTime,
) -> Result<Transaction, AppError> {
    validate_amount(amount)?;

    queries::get_user(conn, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

    let available = available_for_withdrawal(conn, user_id)?;
    if amount > available {
        return Err(AppError::InsufficientFunds {
            requested: amount,
            available,
        });
    }

    record_transaction(
        conn,
        user_id,
        TransactionType::Withdrawal,
        amount,
        None,
        Some(bank_details),
        TransactionStatus::Pending,
        now,
    )
}

/// Settles a pending transaction. Success on a withdrawal re-checks the
/// ledger so approval can never drive the balance negative.
pub fn settle(
    conn: &Connection,
    tx_id: &str,
    outcome: TransactionStatus,
) -> Result<Transaction, AppError> {
    let now = Utc::now().naive_utc();
    settle_at(conn, tx_id, outcome, &now)
}

pub fn settle_at(
    conn: &Connection,
    tx_id: &str,
    outcome: TransactionStatus,
    now: &NaiveDateTime,
) -> Result<Transaction, AppError> {
    if outcome == TransactionStatus::Pending {
        return Err(AppError::Validation(
            "settlement status must be success or failed".to_string(),
        ));
    }

    let tx = queries::get_transaction(conn, tx_id)?
        .ok_or_else(|| AppError::NotFound(format!("transaction {tx_id}")))?;

    if tx.status != TransactionStatus::Pending {
        return Err(AppError::InvalidTransition(format!(
            "transaction {} is already {}",
            tx.id,
            tx.status.as_str()
        )));
    }

    if tx.tx_type == TransactionType::Withdrawal && outcome == TransactionStatus::Success {
        let balance = compute_balance(conn, &tx.user_id)?;
        if tx.amount > balance {
            return Err(AppError::InsufficientFunds {
                requested: tx.amount,
                available: balance,
            });
        }
    }

    let applied = queries::settle_transaction(conn, tx_id, outcome, now)?;
    if !applied {
        return Err(AppError::InvalidTransition(format!(
            "transaction {tx_id} is already settled"
        )));
    }

    if tx.tx_type == TransactionType::Payment && outcome == TransactionStatus::Success {
        if let Some(booking_id) = &tx.booking_id {
            queries::set_payment_status(conn, booking_id, PaymentStatus::Success, now)?;
        }
    }

    queries::get_transaction(conn, tx_id)?
        .ok_or_else(|| AppError::NotFound(format!("transaction {tx_id}")))
}

/// Gateway-callback boundary: records the capture in the ledger and marks
/// the booking. Captures arrive already settled; re-capturing a booking
/// whose payment succeeded is rejected.
pub fn capture_payment(
    conn: &Connection,
    booking_id: &str,
    outcome: PaymentStatus,
) -> Result<Booking, AppError> {
    let now = Utc::now().naive_utc();
    capture_payment_at(conn, booking_id, outcome, &now)
}

pub fn capture_payment_at(
    conn: &Connection,
    booking_id: &str,
    outcome: PaymentStatus,
    now: &NaiveDateTime,
) -> Result<Booking, AppError> {
    if outcome == PaymentStatus::Pending {
        return Err(AppError::Validation(
            "payment outcome must be success or failed".to_string(),
        ));
    }

    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.payment_status == PaymentStatus::Success {
        return Err(AppError::InvalidTransition(format!(
            "payment for booking {} is already captured",
            booking.id
        )));
    }

    let status = match outcome {
        PaymentStatus::Success => TransactionStatus::Success,
        _ => TransactionStatus::Failed,
    };
    record_transaction(
        conn,
        &booking.customer_id,
        TransactionType::Payment,
        booking.amount,
        Some(booking.id.clone()),
        None,
        status,
        now,
    )?;

    queries::set_payment_status(conn, booking_id, outcome, now)?;

    tracing::info!(booking_id = %booking.id, outcome = outcome.as_str(), "payment captured");

    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}
