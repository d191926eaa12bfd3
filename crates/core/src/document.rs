//! Year-scoped sequential document numbers.
//!
//! Every business document (sale, invoice, transfer, ...) carries a
//! human-readable number built from a fixed prefix, the calendar year and a
//! zero-padded sequence that restarts at 1 each year, per tenant. Payments
//! are the exception: they are numbered under their invoice
//! (`FAC2026000001-PAY001`).

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// The kinds of numbered documents the platform issues.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Sale,
    Invoice,
    Transfer,
    InventoryCount,
    Expense,
    CashMovement,
    Loan,
}

impl DocumentKind {
    /// Document prefix as printed on the number.
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Sale => "VTE",
            DocumentKind::Invoice => "FAC",
            DocumentKind::Transfer => "TR",
            DocumentKind::InventoryCount => "INV",
            DocumentKind::Expense => "DEP",
            DocumentKind::CashMovement => "MVT",
            DocumentKind::Loan => "EMP",
        }
    }

    /// Width of the zero-padded sequence component.
    pub fn sequence_width(self) -> usize {
        match self {
            DocumentKind::Sale | DocumentKind::Invoice | DocumentKind::CashMovement => 6,
            DocumentKind::Transfer
            | DocumentKind::InventoryCount
            | DocumentKind::Expense
            | DocumentKind::Loan => 5,
        }
    }
}

/// A rendered document number (e.g. `VTE2026000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentNumber(String);

impl ValueObject for DocumentNumber {}

impl DocumentNumber {
    /// Render a number for `kind` in `year` at position `sequence` (1-based).
    pub fn render(kind: DocumentKind, year: i32, sequence: u64) -> DomainResult<Self> {
        if sequence == 0 {
            return Err(DomainError::validation("document sequence starts at 1"));
        }
        Ok(Self(format!(
            "{}{}{:0width$}",
            kind.prefix(),
            year,
            sequence,
            width = kind.sequence_width()
        )))
    }

    /// Render a payment number scoped under its invoice number.
    pub fn render_payment(invoice_number: &DocumentNumber, sequence: u64) -> DomainResult<Self> {
        if sequence == 0 {
            return Err(DomainError::validation("payment sequence starts at 1"));
        }
        Ok(Self(format!("{}-PAY{:03}", invoice_number.0, sequence)))
    }

    /// Wrap an already-rendered number without re-validating its shape.
    ///
    /// Used when rehydrating aggregates from stored events.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_numbers_use_six_digit_sequence() {
        let n = DocumentNumber::render(DocumentKind::Sale, 2026, 42).unwrap();
        assert_eq!(n.as_str(), "VTE2026000042");
    }

    #[test]
    fn transfer_numbers_use_five_digit_sequence() {
        let n = DocumentNumber::render(DocumentKind::Transfer, 2026, 7).unwrap();
        assert_eq!(n.as_str(), "TR202600007");
    }

    #[test]
    fn payment_numbers_nest_under_invoice() {
        let invoice = DocumentNumber::render(DocumentKind::Invoice, 2026, 1).unwrap();
        let payment = DocumentNumber::render_payment(&invoice, 3).unwrap();
        assert_eq!(payment.as_str(), "FAC2026000001-PAY003");
    }

    #[test]
    fn zero_sequence_is_rejected() {
        let err = DocumentNumber::render(DocumentKind::Invoice, 2026, 0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let invoice = DocumentNumber::render(DocumentKind::Invoice, 2026, 1).unwrap();
        let err = DocumentNumber::render_payment(&invoice, 0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn numbers_are_compared_by_value() {
        let a = DocumentNumber::render(DocumentKind::Expense, 2025, 12).unwrap();
        let b = DocumentNumber::from_raw("DEP202500012");
        assert_eq!(a, b);
    }
}
