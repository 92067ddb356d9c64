//! Per-cycle flows: the retry-bounded stage machines for each agent kind.
//!
//! Every stage shares one envelope: bounded attempts, first-time prompt on
//! the first try, regen prompt with the accumulated error text afterwards.
//! A stage's chat delta is folded into the cycle history and persisted as
//! soon as generation succeeds; execution failures feed the same error
//! accumulator as generation failures. A stage that exhausts its budget
//! fails the cycle's outcome but the strategy record is still written.

pub mod marketing;
pub mod trading;

pub use marketing::{marketing_flow, MarketingCycle};
pub use trading::{assisted_flow, unassisted_flow, TradingCycle};

pub(crate) const STRATEGY_ATTEMPTS: usize = 3;
pub(crate) const RESEARCH_ATTEMPTS: usize = 3;
pub(crate) const CODE_ATTEMPTS: usize = 3;

/// Placeholder used when no similar past strategy can be retrieved.
pub(crate) const NO_RAG_RESULT: &str =
    "Unable to retrieve a relevant past strategy for this situation...";

/// Literal environment string for a cycle that starts with no
/// notification.
pub(crate) const FRESH_ENVIRONMENT: &str = "Fresh";
