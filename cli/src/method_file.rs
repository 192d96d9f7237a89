//! JSON description of a method to translate.
//!
//! ```json
//! {
//!   "name": "add",
//!   "local_count": 2,
//!   "required_args": 2,
//!   "literals": [{ "symbol": "Limit" }, "global_cache"],
//!   "caches": [{ "name": "+" }],
//!   "code": [{ "op": "push_local", "index": 0 }, { "op": "ret" }]
//! }
//! ```
//!
//! A cache may name the single class it has seen, and the body it dispatched
//! to, which makes the site a candidate for inlining.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bcjit_core::bytecode::{CompiledMethod, Instruction, Literal};
use bcjit_core::rt::{GlobalCacheEntry, GlobalSerial, InlineCache, intern};
use serde::Deserialize;

/// Execute address recorded in caches that do not give one.
const DEFAULT_EXECUTE: u64 = 0x1000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub stack_size: Option<usize>,
    #[serde(default)]
    pub local_count: usize,
    #[serde(default)]
    pub required_args: usize,
    #[serde(default)]
    pub literals: Vec<LiteralSpec>,
    #[serde(default)]
    pub caches: Vec<CacheSpec>,
    pub code: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralSpec {
    Nil,
    True,
    False,
    Fixnum(i64),
    Symbol(String),
    Object(String),
    /// A constant cache entry, empty until first filled.
    GlobalCache,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSpec {
    pub name: String,
    #[serde(default)]
    pub execute: Option<u64>,
    #[serde(default)]
    pub monomorphic: Option<TargetSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    pub class: i64,
    #[serde(default)]
    pub method: u64,
    pub body: Option<Box<MethodSpec>>,
}

impl MethodSpec {
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).context("parse method description")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let source =
            std::fs::read_to_string(path).with_context(|| format!("read method from {}", path.display()))?;
        Self::from_json(&source).with_context(|| format!("in {}", path.display()))
    }

    /// Build the method and its side tables. Constant caches share `serial`.
    pub fn build(&self, serial: &Arc<GlobalSerial>) -> Result<CompiledMethod> {
        if self.code.is_empty() {
            bail!("method `{}` has no code", self.name);
        }
        let literals = self
            .literals
            .iter()
            .map(|literal| match literal {
                LiteralSpec::Nil => Literal::Nil,
                LiteralSpec::True => Literal::True,
                LiteralSpec::False => Literal::False,
                LiteralSpec::Fixnum(n) => Literal::Fixnum(*n),
                LiteralSpec::Symbol(name) => Literal::Symbol(name.clone()),
                LiteralSpec::Object(repr) => Literal::Object(repr.clone()),
                LiteralSpec::GlobalCache => Literal::GlobalCache(Arc::new(GlobalCacheEntry::new(serial.clone()))),
            })
            .collect();
        let caches = self
            .caches
            .iter()
            .map(|cache| cache.build(serial))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("caches of `{}`", self.name))?;

        let mut method = CompiledMethod::new(self.name.clone(), self.code.clone())
            .with_literals(literals)
            .with_caches(caches)
            .with_locals(self.local_count, self.required_args);
        if let Some(stack_size) = self.stack_size {
            method = method.with_stack_size(stack_size);
        }
        Ok(method)
    }
}

impl CacheSpec {
    fn build(&self, serial: &Arc<GlobalSerial>) -> Result<Arc<InlineCache>> {
        let cache = Arc::new(InlineCache::new(
            intern(&self.name),
            self.execute.unwrap_or(DEFAULT_EXECUTE),
        ));
        if let Some(target) = &self.monomorphic {
            let body = target
                .body
                .as_ref()
                .map(|body| body.build(serial).map(Arc::new))
                .transpose()
                .with_context(|| format!("target of `{}`", self.name))?;
            cache.record(target.class, target.method, body);
        }
        Ok(cache)
    }
}
