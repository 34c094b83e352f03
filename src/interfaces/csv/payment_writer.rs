use crate::domain::payment::{Payment, PaymentSummary};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Flat CSV view of a payment. Amounts are printed in major units.
#[derive(Debug, Serialize)]
struct PaymentRow<'a> {
    payment: String,
    user: &'a str,
    course: &'a str,
    amount: Decimal,
    currency: &'static str,
    status: String,
    order: &'a str,
    gateway_payment: &'a str,
    method: &'static str,
    refunded: Decimal,
    enrollments: u64,
}

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    payment: String,
    course: &'a str,
    amount: Decimal,
    currency: &'static str,
    status: String,
    method: &'static str,
    receipt: &'a str,
    created_at: String,
    completed_at: String,
}

/// Writes payments to any `Write` sink (stdout, a file) as CSV.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// One row per payment, with the course's current enrollment count alongside.
    pub fn write_payments<I>(&mut self, payments: I) -> Result<()>
    where
        I: IntoIterator<Item = (Payment, u64)>,
    {
        for (payment, enrollments) in payments {
            let refunded = payment
                .refund
                .as_ref()
                .map(|r| r.amount.to_major(payment.currency))
                .unwrap_or(Decimal::ZERO);
            self.writer.serialize(PaymentRow {
                payment: payment.id.to_string(),
                user: payment.user.as_str(),
                course: payment.course.as_str(),
                amount: payment.amount.to_major(payment.currency),
                currency: payment.currency.code(),
                status: payment.status.to_string(),
                order: &payment.gateway_order_id,
                gateway_payment: payment.gateway_payment_id.as_deref().unwrap_or(""),
                method: payment.method.map(|m| m.as_str()).unwrap_or(""),
                refunded,
                enrollments,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_history(&mut self, history: &[PaymentSummary]) -> Result<()> {
        for summary in history {
            self.writer.serialize(HistoryRow {
                payment: summary.id.to_string(),
                course: summary.course.as_str(),
                amount: summary.amount.to_major(summary.currency),
                currency: summary.currency.code(),
                status: summary.status.to_string(),
                method: summary.method.map(|m| m.as_str()).unwrap_or(""),
                receipt: &summary.receipt,
                created_at: summary.created_at.to_rfc3339(),
                completed_at: summary
                    .completed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
