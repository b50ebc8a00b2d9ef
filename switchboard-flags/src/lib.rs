//! Switchboard Flags - Targeting and Variant Evaluation
//!
//! Turns a caller into a [`TargetingIdentity`](switchboard_core::TargetingIdentity)
//! and a flag into a variant for that identity.

pub mod evaluator;
pub mod targeting;

pub use evaluator::{bucket, Evaluation, EvaluationReason, VariantEvaluator};
pub use targeting::{DefaultTargetingResolver, TargetingResolver};
