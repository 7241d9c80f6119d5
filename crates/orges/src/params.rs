//! Minimal parameter and return specifications.
//!
//! Parameter domains (intervals, steps, distributions) belong to whoever
//! builds argument sets. The invoker only needs the ordered parameter names to
//! check that an argument set can be applied, and the return specification to
//! tell callers which direction is better.

use crate::{args::Args, error::TaskFailure};

/// A declared parameter of the objective function.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Param {
    pub name: String,
    pub display_name: Option<String>,
}

impl Param {
    /// Name used when reporting, falling back to the parameter name.
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered parameters of an objective function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamSpec {
    params: Vec<Param>,
}

impl ParamSpec {
    pub const fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Declares the next parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            display_name: None,
        });
        self
    }

    /// Declares the next parameter with a human readable name.
    #[must_use]
    pub fn param_with_display(
        mut self,
        name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        self.params.push(Param {
            name: name.into(),
            display_name: Some(display_name.into()),
        });
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Verifies that `args` names every parameter, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskFailure::CallNotPossible`] on an arity or name mismatch.
    pub fn check(&self, args: &Args) -> Result<(), TaskFailure> {
        if args.len() != self.params.len() {
            return Err(TaskFailure::CallNotPossible {
                reason: format!(
                    "Function expects {} arguments but {} were given",
                    self.params.len(),
                    args.len()
                ),
            });
        }

        for (param, arg) in self.params.iter().zip(args) {
            if param.name != arg.name {
                return Err(TaskFailure::CallNotPossible {
                    reason: format!(
                        "Expected argument `{}` but got `{}`",
                        param.name, arg.name
                    ),
                });
            }
        }

        Ok(())
    }
}

/// A declared return value and its optimization direction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReturnValue {
    pub name: String,
    pub minimize: bool,
}

/// What the objective function returns and which direction is better.
///
/// Without a return specification callers assume a single value to minimize.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReturnSpec {
    values: Vec<ReturnValue>,
}

impl ReturnSpec {
    pub fn minimize(name: impl Into<String>) -> Self {
        Self {
            values: vec![ReturnValue {
                name: name.into(),
                minimize: true,
            }],
        }
    }

    pub fn maximize(name: impl Into<String>) -> Self {
        Self {
            values: vec![ReturnValue {
                name: name.into(),
                minimize: false,
            }],
        }
    }

    pub fn values(&self) -> &[ReturnValue] {
        &self.values
    }

    /// Whether the primary return value is minimized.
    pub fn is_minimization(&self) -> bool {
        self.values.first().is_none_or(|value| value.minimize)
    }

    /// Whether `candidate` improves on `incumbent` for the primary value.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        if self.is_minimization() {
            candidate < incumbent
        } else {
            candidate > incumbent
        }
    }
}

impl Default for ReturnSpec {
    fn default() -> Self {
        Self::minimize("fitness")
    }
}
