//! Query signatures, uncached evaluation, and the query cache for Trestle.
//!
//! This crate provides:
//! - [`Term`] / [`QueryDesc`] - Query signature model and configuration
//! - [`Query`] / [`QueryEvaluator`] - The uncached term evaluator
//! - [`QueryCache`] - A materialized, group-ordered index of matched tables,
//!   reconciled incrementally on structural change

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow large error types - our Error has rich context
#![allow(clippy::result_large_err)]
// Allow missing error docs for now
#![allow(clippy::missing_errors_doc)]

pub mod cache;
pub mod eval;
pub mod term;

pub use cache::{BucketIter, CacheIter, GroupInfo, MatchView, QueryCache};
pub use eval::{Query, QueryEvaluator, TableMatch};
pub use term::{
    GroupByFn, GroupCreateFn, GroupDeleteFn, OrderByFn, QueryDesc, QueryFlags, RefFlags, RefName,
    Term, TermInOut, TermOper, TermRef,
};
