//! A small stand-in for the VM: enough object model, dispatch and
//! non-local control state to execute translated methods in the evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};

use crate::bytecode::{CompiledMethod, Literal};
use crate::ir::Function;
use crate::ir::eval::{Evaluator, Memory, Runtime};
use crate::rt::layout::{self, WORD_SIZE};
use crate::rt::{GlobalCacheEntry, InlineCache, RuntimeHelper, value};

/// Execute pointer of every mock cache: the runtime's generic dispatcher.
pub(crate) const GENERIC_EXECUTE: u64 = 0x5e4d;

const VM_HANDLE: i64 = 0x7a11;

pub(crate) mod class {
    pub(crate) const OBJECT: i64 = 0x100;
    pub(crate) const INTEGER: i64 = 0x108;
    pub(crate) const FLOAT: i64 = 0x110;
    pub(crate) const SYMBOL: i64 = 0x118;
    pub(crate) const NIL: i64 = 0x120;
    pub(crate) const TRUE: i64 = 0x128;
    pub(crate) const FALSE: i64 = 0x130;
    pub(crate) const BIGNUM: i64 = 0x138;
    pub(crate) const ARRAY: i64 = 0x140;
    pub(crate) const EXCEPTION: i64 = 0x148;
}

/// A non-local transfer the VM is carrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    Raise(i64),
    Break(i64),
    Return(i64),
}

/// What a mock method does when dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reply {
    Value(i64),
    /// Return the receiver.
    Receiver,
    /// Return the first argument.
    FirstArg,
    Raise(i64),
    Break(i64),
}

#[derive(Debug, Default)]
pub(crate) struct MockVm {
    pub(crate) classes: HashMap<i64, i64>,
    pub(crate) methods: HashMap<(i64, i64), Reply>,
    pub(crate) caches: Vec<Arc<InlineCache>>,
    /// Global cache entries by the literal index compiled code names them with.
    pub(crate) const_entries: HashMap<i64, Arc<GlobalCacheEntry>>,
    pub(crate) constants: HashMap<i64, i64>,
    /// Words readable at foreign addresses, like a profiler flag.
    pub(crate) externals: HashMap<u64, i64>,
    pub(crate) pending: Option<Pending>,
    /// Raise this from the next interrupt check.
    pub(crate) interrupt: Option<i64>,
    /// Selector and argument count the interpreter resumes with after an
    /// uncommon trap.
    pub(crate) resume: Option<(i64, usize)>,
    /// What the interpreter computes from the resumed send's result on its
    /// way to the end of the method. Without it the send is the last step.
    pub(crate) finish: Option<fn(i64) -> i64>,
    pub(crate) dispatches: usize,
    pub(crate) uncommon_traps: usize,
    pub(crate) const_lookups: usize,
    pub(crate) calls: Vec<RuntimeHelper>,
    /// Selectors in dispatch order.
    pub(crate) sent: Vec<i64>,
    next_object: i64,
}

impl MockVm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A fresh heap reference of class `klass`.
    pub(crate) fn object(&mut self, klass: i64) -> i64 {
        self.next_object += 1;
        let word = 0x10_0000 + self.next_object * WORD_SIZE;
        self.classes.insert(word, klass);
        word
    }

    pub(crate) fn define(&mut self, klass: i64, selector: i64, reply: Reply) {
        self.methods.insert((klass, selector), reply);
    }

    pub(crate) fn track(&mut self, cache: &Arc<InlineCache>) {
        self.caches.push(cache.clone());
    }

    pub(crate) fn called(&self, helper: RuntimeHelper) -> usize {
        self.calls.iter().filter(|h| **h == helper).count()
    }

    pub(crate) fn class_of(&self, word: i64) -> i64 {
        match word {
            value::Q_NIL => class::NIL,
            value::Q_TRUE => class::TRUE,
            value::Q_FALSE => class::FALSE,
            w if value::is_fixnum(w) => class::INTEGER,
            w if value::is_symbol(w) => class::SYMBOL,
            w => self.classes.get(&w).copied().unwrap_or(class::OBJECT),
        }
    }

    fn integer_op(&mut self, selector: &str, recv: i64, arg: i64) -> Result<i64> {
        if !value::is_fixnum(arg) {
            return match selector {
                "==" | "===" => Ok(value::Q_FALSE),
                _ => bail!("Integer#{selector} with a non-integer argument"),
            };
        }
        let (a, b) = (value::fixnum_value(recv), value::fixnum_value(arg));
        let result = match selector {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            "<" => return Ok(value::boolean(a < b)),
            ">" => return Ok(value::boolean(a > b)),
            "==" | "===" => return Ok(value::boolean(a == b)),
            other => bail!("Integer#{other} is not defined"),
        };
        match result.and_then(value::fixnum) {
            Some(word) => Ok(word),
            None => Ok(self.object(class::BIGNUM)),
        }
    }

    /// Full method dispatch of `selector` on `recv`.
    pub(crate) fn dispatch(&mut self, recv: i64, selector: i64, args: &[i64]) -> Result<i64> {
        self.dispatches += 1;
        self.sent.push(selector);
        let klass = self.class_of(recv);
        if let Some(reply) = self.methods.get(&(klass, selector)).copied() {
            return Ok(match reply {
                Reply::Value(word) => word,
                Reply::Receiver => recv,
                Reply::FirstArg => args.first().copied().unwrap_or(value::Q_NIL),
                Reply::Raise(exception) => {
                    self.pending = Some(Pending::Raise(exception));
                    value::NULL
                }
                Reply::Break(word) => {
                    self.pending = Some(Pending::Break(word));
                    value::NULL
                }
            });
        }
        let name = crate::rt::Symbol::from_word(selector)
            .and_then(|s| s.name())
            .ok_or_else(|| anyhow!("dispatch of a non-symbol selector {selector:#x}"))?;
        match (&*name, args) {
            (op, [arg]) if klass == class::INTEGER => self.integer_op(op, recv, *arg),
            ("==" | "===", [arg]) => Ok(value::boolean(recv == *arg)),
            _ => bail!("undefined method `{name}` for class {klass:#x}"),
        }
    }

    fn cache_at(&self, address: u64) -> Option<&Arc<InlineCache>> {
        self.caches.iter().find(|c| c.address() == address)
    }

    fn generic_send(&mut self, args: &[i64], memory: &Memory) -> Result<i64> {
        let [_, cache, _, out] = *args else {
            bail!("execute called with {} arguments", args.len());
        };
        let cache = self
            .cache_at(cache as u64)
            .cloned()
            .ok_or_else(|| anyhow!("dispatch through an unknown cache {cache:#x}"))?;
        cache.hit();
        let field = |offset: i64| memory.load(out as u64 + (offset * WORD_SIZE) as u64);
        let recv = field(layout::args::RECV)?;
        let total = field(layout::args::TOTAL)? as usize;
        let argv = field(layout::args::ARGUMENTS)? as u64;
        let values = if total == 0 { Vec::new() } else { memory.read_words(argv, total)? };
        self.dispatch(recv, cache.name().word(), &values)
    }

    fn self_of_frame(&self, memory: &Memory, cf: i64) -> Result<i64> {
        let vars = memory.load(cf as u64 + (layout::call_frame::SCOPE * WORD_SIZE) as u64)?;
        memory.load(vars as u64 + (layout::vars::SELF * WORD_SIZE) as u64)
    }

    fn lookup_const(&mut self, sym: i64) -> i64 {
        self.const_lookups += 1;
        match self.constants.get(&sym).copied() {
            Some(word) => word,
            None => {
                let error = self.object(class::EXCEPTION);
                self.pending = Some(Pending::Raise(error));
                value::NULL
            }
        }
    }
}

impl Runtime for MockVm {
    fn call_helper(&mut self, helper: RuntimeHelper, args: &[i64], memory: &mut Memory) -> Result<i64> {
        use RuntimeHelper as H;
        self.calls.push(helper);
        let arg = |i: usize| {
            args.get(i)
                .copied()
                .ok_or_else(|| anyhow!("{} called without argument {i}", helper.symbol()))
        };
        Ok(match helper {
            H::ReturnToHere => matches!(self.pending, Some(Pending::Return(_))) as i64,
            H::BreakToHere => matches!(self.pending, Some(Pending::Break(_))) as i64,
            H::RaisingException => matches!(self.pending, Some(Pending::Raise(_))) as i64,
            H::ClearRaiseValue => match self.pending.take() {
                Some(Pending::Raise(w) | Pending::Break(w) | Pending::Return(w)) => w,
                None => value::Q_NIL,
            },
            H::SimpleSend | H::SplatSend | H::SplatSendPrivate => {
                let count = arg(3)? as usize;
                let extra = if helper == H::SimpleSend { 1 } else { 3 };
                let words = memory.read_words(arg(4)? as u64, count + extra)?;
                self.dispatch(words[0], arg(2)?, &words[1..=count])?
            }
            H::SuperSend | H::SuperSplatSend => {
                let count = arg(3)? as usize;
                let words = memory.read_words(arg(4)? as u64, count)?;
                let this = self.self_of_frame(memory, arg(1)?)?;
                self.dispatch(this, arg(2)?, &words)?
            }
            H::ContinueUncommon => {
                self.uncommon_traps += 1;
                let depth = arg(4)? as usize;
                let stack = memory.read_words(arg(3)? as u64, depth)?;
                let (selector, argc) = self
                    .resume
                    .ok_or_else(|| anyhow!("uncommon trap without a resume point"))?;
                let recv = stack[depth - 1 - argc];
                let sent = self.dispatch(recv, selector, &stack[depth - argc..])?;
                match self.finish {
                    Some(rest) => rest(sent),
                    None => sent,
                }
            }
            H::ClassId => self.class_of(arg(1)?),
            H::PushConstFast => {
                let found = self.lookup_const(arg(2)?);
                if found != value::NULL
                    && let Some(entry) = self.const_entries.get(&arg(3)?)
                {
                    entry.fill(found);
                }
                found
            }
            H::PushConst => self.lookup_const(arg(2)?),
            H::CheckInterrupts => match self.interrupt.take() {
                Some(exception) => {
                    self.pending = Some(Pending::Raise(exception));
                    value::NULL
                }
                None => value::Q_TRUE,
            },
            H::RaiseReturn | H::EnsureReturn => {
                self.pending = Some(Pending::Return(arg(2)?));
                value::Q_NIL
            }
            H::RaiseBreak => {
                self.pending = Some(Pending::Break(arg(2)?));
                value::Q_NIL
            }
            H::CurrentException => match self.pending {
                Some(Pending::Raise(exception)) => exception,
                _ => value::Q_NIL,
            },
            H::ClearException => {
                if matches!(self.pending, Some(Pending::Raise(_))) {
                    self.pending = None;
                }
                value::Q_NIL
            }
            H::PassedArg => {
                let total = memory.load(arg(1)? as u64 + (layout::args::TOTAL * WORD_SIZE) as u64)?;
                value::boolean(arg(2)? < total)
            }
            H::MakeArray | H::CastArray => self.object(class::ARRAY),
            H::InstanceOf | H::KindOf => value::boolean(self.class_of(arg(1)?) == arg(2)?),
            _ => value::Q_NIL,
        })
    }

    fn call_indirect(&mut self, target: u64, args: &[i64], memory: &mut Memory) -> Result<i64> {
        if target != GENERIC_EXECUTE {
            bail!("call to unknown code at {target:#x}");
        }
        self.generic_send(args, memory)
    }

    fn load_external(&mut self, addr: u64) -> Result<i64> {
        let span = (layout::inline_cache::WORDS * WORD_SIZE) as u64;
        for cache in &self.caches {
            let base = cache.address();
            if (base..base + span).contains(&addr) {
                let index = ((addr - base) / WORD_SIZE as u64) as i64;
                return cache
                    .read_field(index)
                    .ok_or_else(|| anyhow!("no inline cache field {index}"));
            }
        }
        let span = (layout::global_cache::WORDS * WORD_SIZE) as u64;
        for entry in self.const_entries.values() {
            if addr == entry.global().address() {
                return Ok(entry.global().get() as i64);
            }
            let base = entry.address();
            if (base..base + span).contains(&addr) {
                let index = ((addr - base) / WORD_SIZE as u64) as i64;
                return entry
                    .read_field(index)
                    .ok_or_else(|| anyhow!("no global cache field {index}"));
            }
        }
        self.externals
            .get(&addr)
            .copied()
            .ok_or_else(|| anyhow!("load from unmapped address {addr:#x}"))
    }
}

/// Call frame, caller scope and method record for running one method.
pub(crate) struct Harness {
    pub(crate) memory: Memory,
    pub(crate) call_frame: u64,
    /// Locals table of the enclosing scope (depth 1).
    pub(crate) outer_locals: u64,
    pub(crate) literals: u64,
}

impl Harness {
    pub(crate) fn new(method: &CompiledMethod) -> Self {
        let mut memory = Memory::new();
        let literal_words: Vec<i64> = method
            .literals
            .iter()
            .enumerate()
            .map(|(i, literal)| match literal {
                Literal::Object(_) | Literal::GlobalCache(_) => 0x20_0000 + i as i64 * WORD_SIZE,
                other => other.immediate().unwrap_or(value::Q_NIL),
            })
            .collect();
        let literals = memory.allocate_with(&literal_words);
        let cm = memory.allocate_with(&[literals as i64, 0x7770]);
        let outer_locals = memory.allocate_with(&[value::Q_NIL; 4]);
        let outer_scope = memory.allocate_with(&[outer_locals as i64]);
        let call_frame = memory.allocate_with(&[0, 0, cm as i64, 0, outer_scope as i64]);
        Self {
            memory,
            call_frame,
            outer_locals,
            literals,
        }
    }

    pub(crate) fn run(&mut self, function: &Function, vm: &mut MockVm, recv: i64, argv: &[i64]) -> Result<i64> {
        let argv_ptr = if argv.is_empty() {
            0
        } else {
            self.memory.allocate_with(argv)
        };
        let args = self
            .memory
            .allocate_with(&[recv, value::Q_NIL, argv.len() as i64, argv_ptr as i64, 0]);
        Evaluator::new(function).run(vm, &mut self.memory, [VM_HANDLE, self.call_frame as i64, args as i64])
    }

    pub(crate) fn frame_word(&self, offset: i64) -> i64 {
        self.memory
            .load(self.call_frame + (offset * WORD_SIZE) as u64)
            .unwrap_or(value::NULL)
    }
}
