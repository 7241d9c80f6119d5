use crate::{
    caller::SharedCaller,
    error::{Error, Result},
    function::Function,
    params::{ParamSpec, ReturnSpec},
};
use std::sync::Arc;

/// Configuration surface shared by the concrete invokers.
pub(crate) struct Settings<R, K> {
    pub function: Option<Function<R>>,
    pub param_spec: Option<Arc<ParamSpec>>,
    pub return_spec: Option<ReturnSpec>,
    pub caller: Option<SharedCaller<R, K>>,
}

/// What a task captures from [`Settings`] when it is accepted.
pub(crate) struct Snapshot<R, K> {
    pub function: Function<R>,
    pub params: Arc<ParamSpec>,
    pub caller: SharedCaller<R, K>,
}

impl<R, K> Settings<R, K> {
    /// Captures the configuration for one task.
    ///
    /// # Errors
    ///
    /// A configuration error naming the first missing piece.
    pub fn snapshot(&self) -> Result<Snapshot<R, K>> {
        let params = self.param_spec.clone().ok_or(Error::NoParamSpec)?;
        let function = self.function.clone().ok_or(Error::NoFunction)?;
        let caller = self.caller.clone().ok_or(Error::NoCaller)?;

        Ok(Snapshot {
            function,
            params,
            caller,
        })
    }

    pub fn param_spec(&self) -> Option<ParamSpec> {
        self.param_spec.as_deref().cloned()
    }

    pub fn set_param_spec(&mut self, param_spec: ParamSpec) {
        self.param_spec = Some(Arc::new(param_spec));
    }
}

impl<R, K> Default for Settings<R, K> {
    fn default() -> Self {
        Self {
            function: None,
            param_spec: None,
            return_spec: None,
            caller: None,
        }
    }
}
