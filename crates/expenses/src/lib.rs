//! `ventora-expenses` — operating expenses with an approval workflow.

pub mod expense;

pub use expense::{
    Expense, ExpenseCategory, ExpenseCommand, ExpenseEvent, ExpenseId, ExpenseStatus,
};
