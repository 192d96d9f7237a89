//! Reference interpreter for translated functions.
//!
//! Runs a [`Function`] the way the backend would, against a [`Runtime`]
//! standing in for the helper routines. Frame allocations live in a word
//! addressed [`Memory`]; every other address (inline caches, global serials,
//! runtime objects) is resolved by the runtime.

use anyhow::{Context, Result, anyhow, bail};

use crate::rt::RuntimeHelper;
use crate::rt::layout::WORD_SIZE;

use super::{BinaryOp, BlockId, Callee, CastOp, Function, IcmpPred, InstKind, Intrinsic, Operand, Terminator, Ty};

/// Default instruction budget of one [`Evaluator::run`].
pub const DEFAULT_FUEL: u64 = 1_000_000;

const REGION_BASE: u64 = 0x4000_0000_0000_0000;
const REGION_SPAN: u64 = 1 << 32;

/// Word-addressed scratch memory backing `alloca`s and runtime-built records.
///
/// Region `n` starts at `REGION_BASE + n * 2^32`, far away from any address a
/// real Rust allocation could have, so owned and external addresses never
/// collide.
#[derive(Debug, Default, Clone)]
pub struct Memory {
    regions: Vec<Vec<i64>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `words` zeroed words and return the address of the first.
    pub fn allocate(&mut self, words: usize) -> u64 {
        self.allocate_with(&vec![0; words])
    }

    pub fn allocate_with(&mut self, data: &[i64]) -> u64 {
        let base = REGION_BASE + (self.regions.len() as u64) * REGION_SPAN;
        self.regions.push(data.to_vec());
        base
    }

    pub fn owns(&self, addr: u64) -> bool {
        addr >= REGION_BASE && (((addr - REGION_BASE) / REGION_SPAN) as usize) < self.regions.len()
    }

    fn slot(&self, addr: u64) -> Result<(usize, usize)> {
        if !self.owns(addr) {
            bail!("address {addr:#x} is not owned by the evaluator memory");
        }
        let rel = addr - REGION_BASE;
        let region = (rel / REGION_SPAN) as usize;
        let offset = rel % REGION_SPAN;
        if offset % WORD_SIZE as u64 != 0 {
            bail!("misaligned access at {addr:#x}");
        }
        let word = (offset / WORD_SIZE as u64) as usize;
        let len = self.regions[region].len();
        if word >= len {
            bail!("access at {addr:#x} is past the end of a {len}-word region");
        }
        Ok((region, word))
    }

    pub fn load(&self, addr: u64) -> Result<i64> {
        let (region, word) = self.slot(addr)?;
        Ok(self.regions[region][word])
    }

    pub fn store(&mut self, addr: u64, value: i64) -> Result<()> {
        let (region, word) = self.slot(addr)?;
        self.regions[region][word] = value;
        Ok(())
    }

    pub fn read_words(&self, addr: u64, count: usize) -> Result<Vec<i64>> {
        (0..count)
            .map(|i| self.load(addr + (i as u64) * WORD_SIZE as u64))
            .collect()
    }
}

/// The helper routines and foreign memory emitted code talks to.
pub trait Runtime {
    /// Invoke `helper`. Pointer arguments arrive as their integer address,
    /// `i1`/`i32` arguments zero- or sign-extended to a word. Void helpers
    /// return anything; the result is discarded.
    fn call_helper(&mut self, helper: RuntimeHelper, args: &[i64], memory: &mut Memory) -> Result<i64>;

    /// Invoke a function pointer loaded by the code itself (an inline cache's
    /// `execute` slot).
    fn call_indirect(&mut self, target: u64, args: &[i64], memory: &mut Memory) -> Result<i64>;

    fn load_external(&mut self, addr: u64) -> Result<i64>;

    fn store_external(&mut self, addr: u64, value: i64) -> Result<()> {
        let _ = value;
        Err(anyhow!("store to foreign address {addr:#x} is not supported"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RtValue {
    Word(i64),
    Pair(i64, bool),
}

/// Sign-extend the low 63 bits.
fn wrap63(v: i64) -> i64 {
    v.wrapping_shl(1) >> 1
}

fn normalize(ty: Ty, v: i64) -> i64 {
    match ty {
        Ty::I1 => v & 1,
        Ty::I32 => v as i32 as i64,
        Ty::I63 => wrap63(v),
        _ => v,
    }
}

pub struct Evaluator<'f> {
    function: &'f Function,
    fuel: u64,
}

impl<'f> Evaluator<'f> {
    pub fn new(function: &'f Function) -> Self {
        Self {
            function,
            fuel: DEFAULT_FUEL,
        }
    }

    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    /// Execute the function with `params` bound to `(vm, call_frame, args)`.
    pub fn run<R: Runtime + ?Sized>(&self, runtime: &mut R, memory: &mut Memory, params: [i64; 3]) -> Result<i64> {
        let mut frame = Frame {
            function: self.function,
            values: vec![None; self.function.values.len()],
            params,
        };
        let mut fuel = self.fuel;
        let mut prev: Option<BlockId> = None;
        let mut current = BlockId::entry();

        loop {
            let block = self
                .function
                .block(current)
                .ok_or_else(|| anyhow!("branch to unknown block {}", current.index()))?;

            // Phis read their inputs before any of them is written.
            let mut phi_values = Vec::new();
            for inst in &block.insts {
                let InstKind::Phi { ty, incoming } = &inst.kind else {
                    break;
                };
                let from = prev.ok_or_else(|| anyhow!("phi in {} without a predecessor", block.label))?;
                let (value, _) = incoming
                    .iter()
                    .find(|(_, pred)| *pred == from)
                    .ok_or_else(|| anyhow!("phi in {} has no edge from block {}", block.label, from.index()))?;
                phi_values.push((inst.result, normalize(*ty, frame.word(value)?)));
            }
            for (result, value) in phi_values {
                if let Some(id) = result {
                    frame.values[id.index()] = Some(RtValue::Word(value));
                }
            }

            for inst in block.insts.iter().filter(|i| !matches!(i.kind, InstKind::Phi { .. })) {
                fuel = fuel
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("evaluation of {} ran out of fuel", self.function.name))?;
                let value = frame
                    .exec(&inst.kind, runtime, memory)
                    .with_context(|| format!("in block {}", block.label))?;
                if let (Some(id), Some(value)) = (inst.result, value) {
                    frame.values[id.index()] = Some(value);
                }
            }

            let terminator = block
                .terminator
                .as_ref()
                .ok_or_else(|| anyhow!("block {} has no terminator", block.label))?;
            let next = match terminator {
                Terminator::Br { target } => *target,
                Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if frame.word(cond)? & 1 != 0 {
                        *then_block
                    } else {
                        *else_block
                    }
                }
                Terminator::Ret { value } => return frame.word(value),
                Terminator::Unreachable => bail!("reached unreachable code in {}", block.label),
            };
            prev = Some(current);
            current = next;
        }
    }
}

struct Frame<'f> {
    function: &'f Function,
    values: Vec<Option<RtValue>>,
    params: [i64; 3],
}

impl Frame<'_> {
    fn value(&self, operand: &Operand) -> Result<RtValue> {
        match operand {
            Operand::Value(id) => self
                .values
                .get(id.index())
                .copied()
                .flatten()
                .ok_or_else(|| anyhow!("use of undefined value %{}", id.index())),
            Operand::Param(p) => Ok(RtValue::Word(self.params[p.index()])),
            Operand::Const(ty, v) => Ok(RtValue::Word(normalize(*ty, *v))),
        }
    }

    fn word(&self, operand: &Operand) -> Result<i64> {
        match self.value(operand)? {
            RtValue::Word(v) => Ok(v),
            RtValue::Pair(..) => bail!("aggregate used where a scalar was expected"),
        }
    }

    fn load<R: Runtime + ?Sized>(&self, runtime: &mut R, memory: &Memory, addr: u64) -> Result<i64> {
        if memory.owns(addr) {
            memory.load(addr)
        } else {
            runtime.load_external(addr)
        }
    }

    fn exec<R: Runtime + ?Sized>(
        &self,
        kind: &InstKind,
        runtime: &mut R,
        memory: &mut Memory,
    ) -> Result<Option<RtValue>> {
        let word = |v: i64| Ok(Some(RtValue::Word(v)));
        match kind {
            InstKind::Alloca { count } => word(memory.allocate(*count as usize) as i64),
            InstKind::ElementPtr { base, offset } => {
                word(self.word(base)?.wrapping_add(offset.wrapping_mul(WORD_SIZE)))
            }
            InstKind::Load { ty, ptr } => {
                let addr = self.word(ptr)? as u64;
                word(normalize(*ty, self.load(runtime, memory, addr)?))
            }
            InstKind::Store { value, ptr } => {
                let addr = self.word(ptr)? as u64;
                let value = self.word(value)?;
                if memory.owns(addr) {
                    memory.store(addr, value)?;
                } else {
                    runtime.store_external(addr, value)?;
                }
                Ok(None)
            }
            InstKind::Binary { op, lhs, rhs } => {
                let ty = self.function.operand_ty(lhs);
                let (l, r) = (self.word(lhs)?, self.word(rhs)?);
                let v = match op {
                    BinaryOp::Add => l.wrapping_add(r),
                    BinaryOp::Sub => l.wrapping_sub(r),
                    BinaryOp::And => l & r,
                    BinaryOp::Or => l | r,
                    BinaryOp::Xor => l ^ r,
                    BinaryOp::Shl => l.wrapping_shl(r as u32),
                    BinaryOp::AShr => l.wrapping_shr(r as u32),
                };
                word(normalize(ty, v))
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                let (l, r) = (self.word(lhs)?, self.word(rhs)?);
                let hold = match pred {
                    IcmpPred::Eq => l == r,
                    IcmpPred::Ne => l != r,
                    IcmpPred::Slt => l < r,
                    IcmpPred::Sgt => l > r,
                };
                word(hold as i64)
            }
            InstKind::Select {
                cond,
                then_value,
                else_value,
            } => {
                if self.word(cond)? & 1 != 0 {
                    word(self.word(then_value)?)
                } else {
                    word(self.word(else_value)?)
                }
            }
            InstKind::Cast { op, value, to } => {
                let from = self.function.operand_ty(value);
                let v = self.word(value)?;
                let v = match op {
                    CastOp::Trunc => normalize(*to, v),
                    CastOp::SExt if from == Ty::I1 => -(v & 1),
                    CastOp::SExt => normalize(from, v),
                    CastOp::IntToPtr => v,
                };
                word(v)
            }
            InstKind::Overflow { intrinsic, lhs, rhs } => {
                let (l, r) = (wrap63(self.word(lhs)?), wrap63(self.word(rhs)?));
                let exact = match intrinsic {
                    Intrinsic::SAddWithOverflow => l + r,
                    Intrinsic::SSubWithOverflow => l - r,
                };
                let wrapped = wrap63(exact);
                Ok(Some(RtValue::Pair(wrapped, wrapped != exact)))
            }
            InstKind::Extract { aggregate, index } => match self.value(aggregate)? {
                RtValue::Pair(v, _) if *index == 0 => word(v),
                RtValue::Pair(_, flag) if *index == 1 => word(flag as i64),
                _ => bail!("bad extractvalue index {index}"),
            },
            InstKind::Call { callee, ret, args } => {
                let args = args.iter().map(|a| self.word(a)).collect::<Result<Vec<_>>>()?;
                let result = match callee {
                    Callee::Helper(helper) => runtime
                        .call_helper(*helper, &args, memory)
                        .with_context(|| format!("calling {}", helper.symbol()))?,
                    Callee::Indirect(target) => {
                        let target = self.word(target)? as u64;
                        runtime.call_indirect(target, &args, memory)?
                    }
                };
                if *ret == Ty::Void {
                    Ok(None)
                } else {
                    word(normalize(*ret, result))
                }
            }
            InstKind::Phi { .. } => bail!("phi after the head of a block"),
        }
    }
}
