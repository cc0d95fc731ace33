//! Breakpoint conditions
//!
//! A condition decides whether a halt at a watched location is the one the
//! scenario is waiting for. Conditions read target state through a
//! [`ContextEvaluator`] and never resume or otherwise steer the target.
//!
//! Stock conditions:
//!
//! - [`Always`]: every halt qualifies
//! - [`SymbolContains`]: a printed value in some caller frame contains a needle
//! - [`FlagMask`]: a printed integer has any of the masked bits set
//! - [`FnCondition`]: arbitrary closure, for one-off scenarios and tests

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::control::ContextEvaluator;
use crate::error::{RaceError, RaceResult};

/// Predicate evaluated in the halted thread's context
pub trait Condition: Send + Sync {
    /// Evaluate against the current context
    ///
    /// Errors mean the context could not be inspected; callers treat them as
    /// "not this halt".
    fn evaluate(&self, ctx: &dyn ContextEvaluator) -> RaceResult<bool>;

    /// Short human-readable form for logs
    fn describe(&self) -> String;
}

/// Condition that always holds
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Condition for Always {
    fn evaluate(&self, _ctx: &dyn ContextEvaluator) -> RaceResult<bool> {
        Ok(true)
    }

    fn describe(&self) -> String {
        "always".to_string()
    }
}

/// Holds when the printed value of `expression`, evaluated in the frame
/// `frame_depth` levels up, contains `needle`
///
/// Typical use: match the name of a class being prepared, read from the
/// caller of the watched callback.
#[derive(Debug, Clone)]
pub struct SymbolContains {
    pub frame_depth: usize,
    pub expression: String,
    pub needle: String,
}

impl SymbolContains {
    pub fn new(frame_depth: usize, expression: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            frame_depth,
            expression: expression.into(),
            needle: needle.into(),
        }
    }
}

impl Condition for SymbolContains {
    fn evaluate(&self, ctx: &dyn ContextEvaluator) -> RaceResult<bool> {
        if self.frame_depth > 0 {
            ctx.select_frame(self.frame_depth)?;
        }
        let printed = ctx.evaluate_in_context(&self.expression)?;
        Ok(printed.contains(&self.needle))
    }

    fn describe(&self) -> String {
        format!(
            "`{}` (frame {}) contains {:?}",
            self.expression, self.frame_depth, self.needle
        )
    }
}

/// Holds when the trailing integer printed for `expression` has any bit of
/// `mask` set
///
/// Debuggers print values like `$3 = 4`; only the last run of digits counts.
#[derive(Debug, Clone)]
pub struct FlagMask {
    pub expression: String,
    pub mask: u64,
}

impl FlagMask {
    pub fn new(expression: impl Into<String>, mask: u64) -> Self {
        Self {
            expression: expression.into(),
            mask,
        }
    }
}

impl Condition for FlagMask {
    fn evaluate(&self, ctx: &dyn ContextEvaluator) -> RaceResult<bool> {
        let printed = ctx.evaluate_in_context(&self.expression)?;
        let value = trailing_integer(&self.expression, &printed)?;
        Ok(value & self.mask != 0)
    }

    fn describe(&self) -> String {
        format!("`{}` & {:#x}", self.expression, self.mask)
    }
}

static TRAILING_INTEGER: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"(\d+)\s*$"));

fn trailing_integer(expression: &str, printed: &str) -> RaceResult<u64> {
    let re = TRAILING_INTEGER
        .as_ref()
        .map_err(|e| RaceError::evaluation(expression, e.to_string()))?;
    let digits = re
        .captures(printed)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| RaceError::evaluation(expression, format!("no integer in {printed:?}")))?;
    digits
        .as_str()
        .parse::<u64>()
        .map_err(|e| RaceError::evaluation(expression, e.to_string()))
}

/// Closure-backed condition
pub struct FnCondition<F> {
    name: String,
    predicate: F,
}

impl<F> FnCondition<F>
where
    F: Fn(&dyn ContextEvaluator) -> RaceResult<bool> + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> Condition for FnCondition<F>
where
    F: Fn(&dyn ContextEvaluator) -> RaceResult<bool> + Send + Sync,
{
    fn evaluate(&self, ctx: &dyn ContextEvaluator) -> RaceResult<bool> {
        (self.predicate)(ctx)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnCondition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCondition").field("name", &self.name).finish()
    }
}

/// Shorthand for [`FnCondition::new`]
pub fn from_fn<F>(name: impl Into<String>, predicate: F) -> FnCondition<F>
where
    F: Fn(&dyn ContextEvaluator) -> RaceResult<bool> + Send + Sync,
{
    FnCondition::new(name, predicate)
}
