//! Name to procedure registry.

use super::procedures;
use crate::database::Database;
use crate::error::ApiError;
use crate::types::Response;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A server-side procedure: database plus JSON parameters in, envelope out.
pub type Procedure = Arc<dyn Fn(&Database, &Value) -> Response<Value> + Send + Sync>;

/// Registry of named procedures.
pub struct RpcDispatcher {
    procedures: RwLock<HashMap<String, Procedure>>,
}

impl RpcDispatcher {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            procedures: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding `refund_order`, `get_user_balance` and `has_role`.
    pub fn with_builtins() -> Self {
        let dispatcher = Self::new();
        dispatcher.register(procedures::REFUND_ORDER, procedures::refund_order);
        dispatcher.register(procedures::GET_USER_BALANCE, procedures::get_user_balance);
        dispatcher.register(procedures::HAS_ROLE, procedures::has_role);
        dispatcher
    }

    /// Register `procedure` under `name`, replacing any earlier one.
    pub fn register<F>(&self, name: &str, procedure: F)
    where
        F: Fn(&Database, &Value) -> Response<Value> + Send + Sync + 'static,
    {
        let previous = self
            .procedures
            .write()
            .insert(name.to_string(), Arc::new(procedure));
        if previous.is_some() {
            debug!(procedure = name, "procedure replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procedures.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.procedures.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the procedure registered as `name`.
    pub fn call(&self, db: &Database, name: &str, params: &Value) -> Response<Value> {
        let procedure = self.procedures.read().get(name).cloned();
        match procedure {
            Some(procedure) => {
                debug!(procedure = name, "calling procedure");
                procedure(db, params)
            }
            None => {
                warn!(procedure = name, "unknown procedure");
                Response::failure(ApiError::unsupported("Function not found").with_details(name))
            }
        }
    }
}

impl Default for RpcDispatcher {
    fn default() -> Self {
        Self::with_builtins()
    }
}
