//! Execution context
//!
//! Everything evaluation needs besides the item itself: settings, query
//! arguments, the clock, per-context IN tables, buffer pools, user functions
//! and the subquery executor.

use crate::config::EngineConfig;
use crate::error::{EvalError, EvalResult};
use crate::functions::FunctionRegistry;
use crate::inlist::InlistHashes;
use crate::pool::Pools;
use crate::privileges::Privileges;
use chrono::{DateTime, Utc};
use docql_value::{Scope, Value};
use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A planned subquery, opaque to the expression core
pub trait SubqueryPlan: fmt::Debug + Send + Sync {
    /// Canonical source text, used for display and equivalence
    fn text(&self) -> &str;

    /// References variables of the enclosing query
    fn is_correlated(&self) -> bool;

    fn privileges(&self) -> Privileges {
        Privileges::new()
    }
}

/// Runs subqueries on behalf of the expression core
pub trait SubqueryExecutor: Send + Sync {
    fn execute(&self, plan: &dyn SubqueryPlan, item: &Scope<'_>) -> EvalResult<Value>;
}

/// Capabilities an evaluation draws on
pub trait Context: Send + Sync {
    fn config(&self) -> &EngineConfig;

    /// Statement time; stable for the life of the context
    fn now(&self) -> DateTime<Utc>;

    fn named_arg(&self, name: &str) -> Option<&Value>;

    /// 1-based
    fn positional_arg(&self, position: usize) -> Option<&Value>;

    fn inlist_hashes(&self) -> &InlistHashes;

    fn pools(&self) -> &Pools;

    fn functions(&self) -> &FunctionRegistry;

    fn evaluate_subquery(&self, plan: &dyn SubqueryPlan, item: &Scope<'_>) -> EvalResult<Value>;

    /// Compiled form of a LIKE pattern
    fn like_pattern(&self, pattern: &str) -> EvalResult<Arc<Regex>> {
        compile_like(pattern).map(Arc::new)
    }
}

/// Translate a LIKE pattern (`%`, `_`, `\` escapes) to an anchored regex
pub fn compile_like(pattern: &str) -> EvalResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4]))),
                None => re.push_str(r"\\"),
            },
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| EvalError::invalid_pattern(pattern, e.to_string()))
}

/// Standard context for one query execution
pub struct ExecutionContext {
    config: EngineConfig,
    now: DateTime<Utc>,
    named_args: HashMap<String, Value>,
    positional_args: Vec<Value>,
    inlist_hashes: InlistHashes,
    pools: Pools,
    functions: Arc<FunctionRegistry>,
    subqueries: Option<Arc<dyn SubqueryExecutor>>,
    like_cache: RwLock<HashMap<String, Arc<Regex>>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start from defaults: no arguments, no subquery executor
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.config)
            .field("now", &self.now)
            .field("named_args", &self.named_args.len())
            .field("positional_args", &self.positional_args.len())
            .field("inlist_hashes", &self.inlist_hashes.len())
            .field("subqueries", &self.subqueries.is_some())
            .finish()
    }
}

impl Context for ExecutionContext {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn named_arg(&self, name: &str) -> Option<&Value> {
        self.named_args.get(name)
    }

    fn positional_arg(&self, position: usize) -> Option<&Value> {
        position.checked_sub(1).and_then(|i| self.positional_args.get(i))
    }

    fn inlist_hashes(&self) -> &InlistHashes {
        &self.inlist_hashes
    }

    fn pools(&self) -> &Pools {
        &self.pools
    }

    fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    fn evaluate_subquery(&self, plan: &dyn SubqueryPlan, item: &Scope<'_>) -> EvalResult<Value> {
        match &self.subqueries {
            Some(executor) => executor.execute(plan, item),
            None => Err(EvalError::subquery(format!(
                "no subquery executor available for ({})",
                plan.text()
            ))),
        }
    }

    fn like_pattern(&self, pattern: &str) -> EvalResult<Arc<Regex>> {
        if !self.config.like_cache {
            return compile_like(pattern).map(Arc::new);
        }
        if let Some(re) = self.like_cache.read().get(pattern) {
            return Ok(Arc::clone(re));
        }
        let re = Arc::new(compile_like(pattern)?);
        self.like_cache
            .write()
            .insert(pattern.to_string(), Arc::clone(&re));
        Ok(re)
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let outstanding = self.pools.outstanding();
        if outstanding > 0 {
            warn!("execution context dropped with {outstanding} pooled buffers outstanding");
        }
        self.inlist_hashes.clear();
    }
}

/// Builder for [`ExecutionContext`]
#[derive(Default)]
pub struct ExecutionContextBuilder {
    config: Option<EngineConfig>,
    now: Option<DateTime<Utc>>,
    named_args: HashMap<String, Value>,
    positional_args: Vec<Value>,
    functions: Option<FunctionRegistry>,
    subqueries: Option<Arc<dyn SubqueryExecutor>>,
}

impl ExecutionContextBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_named_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named_args.insert(name.into(), value.into());
        self
    }

    /// Append the next positional argument (`$1`, `$2`, ...)
    pub fn with_positional_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional_args.push(value.into());
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_subquery_executor(mut self, executor: Arc<dyn SubqueryExecutor>) -> Self {
        self.subqueries = Some(executor);
        self
    }

    pub fn with_function_registry(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Statement time defaults to now
    pub fn build(self) -> ExecutionContext {
        let config = self.config.unwrap_or_default();
        debug!(
            "new execution context: {} named, {} positional arguments",
            self.named_args.len(),
            self.positional_args.len()
        );
        ExecutionContext {
            pools: Pools::new(config.pool_capacity),
            config,
            now: self.now.unwrap_or_else(Utc::now),
            named_args: self.named_args,
            positional_args: self.positional_args,
            inlist_hashes: InlistHashes::new(),
            functions: Arc::new(self.functions.unwrap_or_default()),
            subqueries: self.subqueries,
            like_cache: RwLock::new(HashMap::new()),
        }
    }
}

/// Context used to probe constant values at plan time
///
/// IN hashing is disabled so probes leave no per-node state behind.
pub(crate) fn probe_context() -> &'static ExecutionContext {
    static PROBE: Lazy<ExecutionContext> = Lazy::new(|| {
        ExecutionContext::builder()
            .with_config(EngineConfig {
                inlist_hash_threshold: usize::MAX,
                ..EngineConfig::default()
            })
            .build()
    });
    &PROBE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a%", "abc", true)]
    #[case("a%", "bac", false)]
    #[case("a_c", "abc", true)]
    #[case("a_c", "abbc", false)]
    #[case("%.txt", "notes.txt", true)]
    #[case("%.txt", "notes_txt", false)]
    #[case(r"100\%", "100%", true)]
    #[case(r"100\%", "1000", false)]
    #[case("a%", "a\nb", true)]
    fn test_like_translation(#[case] pattern: &str, #[case] input: &str, #[case] matches: bool) {
        assert_eq!(compile_like(pattern).unwrap().is_match(input), matches);
    }

    #[test]
    fn test_like_cache_reuses_compiled_pattern() {
        let ctx = ExecutionContext::new();
        let a = ctx.like_pattern("x%").unwrap();
        let b = ctx.like_pattern("x%").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_arguments() {
        let ctx = ExecutionContext::builder()
            .with_named_arg("limit", 10)
            .with_positional_arg("first")
            .build();
        assert_eq!(ctx.named_arg("limit"), Some(&Value::int(10)));
        assert_eq!(ctx.positional_arg(1), Some(&Value::string("first")));
        assert_eq!(ctx.positional_arg(0), None);
        assert_eq!(ctx.positional_arg(2), None);
    }

    #[test]
    fn test_subquery_without_executor() {
        #[derive(Debug)]
        struct Plan;
        impl SubqueryPlan for Plan {
            fn text(&self) -> &str {
                "select 1"
            }
            fn is_correlated(&self) -> bool {
                false
            }
        }

        let ctx = ExecutionContext::new();
        let err = ctx.evaluate_subquery(&Plan, &Scope::empty()).unwrap_err();
        assert!(matches!(err, EvalError::Subquery { .. }));
    }
}
