//! `ventora-cashbox` — cash register sessions and movements.

pub mod session;

pub use session::{
    CashSession, CashSessionCommand, CashSessionEvent, CashSessionId, MovementCategory,
    MovementDirection, SessionStatus,
};
