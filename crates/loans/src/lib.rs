//! `ventora-loans` — borrowed funds and repayment tracking.

pub mod loan;

pub use loan::{Loan, LoanCommand, LoanEvent, LoanId, LoanSource, LoanStatus, total_interest};
