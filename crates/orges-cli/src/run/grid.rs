//! Exhaustive grid search over integer parameters.

use orges::{
    Args, Caller, Error, Invoker, Mutex, Optimizer, ParamSpec, ReturnSpec, TaskFailure,
};
use std::sync::Arc;

/// Outcome of a grid search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub best: Option<(f64, Args)>,
    pub evaluated: usize,
    pub failed: usize,
}

/// Best-so-far bookkeeping, updated from the invoker's callbacks.
#[derive(Debug, Default)]
struct Tracker {
    spec: ReturnSpec,
    report: Report,
}

impl Caller<f64, ()> for Tracker {
    fn on_result(&mut self, value: f64, fargs: Args, _: ()) {
        self.report.evaluated += 1;
        let better = self
            .report
            .best
            .as_ref()
            .is_none_or(|(best, _)| self.spec.is_better(value, *best));
        if better {
            tracing::debug!("New best {value} at {fargs}");
            self.report.best = Some((value, fargs));
        }
    }

    fn on_error(&mut self, error: TaskFailure, fargs: Args, _: ()) {
        self.report.evaluated += 1;
        self.report.failed += 1;
        tracing::debug!("Evaluation at {fargs} failed: {error}");
    }
}

/// Tries every point of `1..=bound` for each parameter, in order.
///
/// Stops submitting as soon as the invoker is stopped and reports the best
/// point among those evaluated.
pub struct GridSearch {
    bounds: Vec<i64>,
}

impl GridSearch {
    /// One inclusive upper bound per parameter, in parameter order.
    pub const fn new(bounds: Vec<i64>) -> Self {
        Self { bounds }
    }
}

impl Optimizer<f64, ()> for GridSearch {
    type Output = Report;

    fn optimize(
        &mut self,
        invoker: &dyn Invoker<f64, ()>,
        param_spec: &ParamSpec,
        return_spec: Option<&ReturnSpec>,
    ) -> orges::Result<Report> {
        if param_spec.len() != self.bounds.len() {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "Grid has {} bounds for {} parameters",
                    self.bounds.len(),
                    param_spec.len()
                ),
            });
        }

        let tracker = Arc::new(Mutex::new(Tracker {
            spec: return_spec.cloned().unwrap_or_default(),
            report: Report::default(),
        }));
        invoker.set_caller(tracker.clone());

        let names = param_spec.params().iter().map(|p| p.name.clone()).collect();
        for point in Grid::new(names, self.bounds.clone()) {
            match invoker.invoke(point, ()) {
                Ok(_) => {}
                Err(Error::Stopped) => {
                    tracing::info!("Invoker stopped, finishing with the evaluated points");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        invoker.wait();

        Ok(tracker.lock().report.clone())
    }
}

/// Odometer over the points of an integer grid.
struct Grid {
    names: Vec<String>,
    bounds: Vec<i64>,
    current: Option<Vec<i64>>,
}

impl Grid {
    fn new(names: Vec<String>, bounds: Vec<i64>) -> Self {
        let current = bounds.iter().all(|b| *b >= 1).then(|| vec![1; bounds.len()]);
        Self {
            names,
            bounds,
            current,
        }
    }
}

impl Iterator for Grid {
    type Item = Args;

    fn next(&mut self) -> Option<Args> {
        let current = self.current.as_mut()?;
        let point = self.names.iter().cloned().zip(current.iter().copied()).collect();

        let mut exhausted = true;
        for (value, bound) in current.iter_mut().zip(&self.bounds).rev() {
            if *value < *bound {
                *value += 1;
                exhausted = false;
                break;
            }
            *value = 1;
        }
        if exhausted {
            self.current = None;
        }

        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orges::{Function, SimpleInvoker, Stoppable};

    fn invoker() -> SimpleInvoker<f64, ()> {
        let invoker = SimpleInvoker::new();
        invoker.set_param_spec(ParamSpec::new().param("a").param("b"));
        invoker.set_function(Function::new(|args: &Args| {
            -(args.int("a").unwrap_or_default() + args.int("b").unwrap_or_default()) as f64
        }));
        invoker
    }

    fn spec() -> ParamSpec {
        ParamSpec::new().param("a").param("b")
    }

    #[test]
    fn grid_visits_every_point_once() {
        let points: Vec<_> = Grid::new(vec!["a".into(), "b".into()], vec![2, 3]).collect();

        assert_eq!(points.len(), 6);
        assert_eq!(points[0], Args::new().with("a", 1).with("b", 1));
        assert_eq!(points[1], Args::new().with("a", 1).with("b", 2));
        assert_eq!(points[5], Args::new().with("a", 2).with("b", 3));
        assert_eq!(Grid::new(vec!["a".into()], vec![0]).count(), 0);
    }

    #[test]
    fn finds_the_minimum_of_the_test_function() {
        let invoker = invoker();
        let report = GridSearch::new(vec![2, 2])
            .optimize(&invoker, &spec(), Some(&ReturnSpec::minimize("fitness")))
            .unwrap();

        assert_eq!(report.evaluated, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(
            report.best,
            Some((-4.0, Args::new().with("a", 2).with("b", 2)))
        );
    }

    #[test]
    fn stopped_invoker_yields_an_empty_report() {
        let invoker = invoker();
        invoker.stop();

        let report = GridSearch::new(vec![2, 2])
            .optimize(&invoker, &spec(), None)
            .unwrap();
        assert_eq!(report, Report::default());
    }

    #[test]
    fn bounds_must_match_the_parameters() {
        let invoker = invoker();
        let err = GridSearch::new(vec![2])
            .optimize(&invoker, &spec(), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }
}
