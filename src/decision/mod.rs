//! Decision pipeline: canonical computation and integrity gating.
//!
//! The computer is the only module in the codebase that derives edges,
//! fair lines, sides and reasons from market and simulation inputs. The
//! validator runs after it with veto power: it blocks, it never fixes.

mod computer;
mod validator;

pub use computer::{prob_to_american, DecisionComputer, DecisionInputs};
pub use validator::{BlockedMarket, IntegrityValidator, ValidationReport};
