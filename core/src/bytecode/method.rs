use std::sync::Arc;

use crate::rt::{GlobalCacheEntry, InlineCache, symbol, value};

use super::Instruction;

/// Entry of a method's literal table.
#[derive(Debug, Clone)]
pub enum Literal {
    Nil,
    True,
    False,
    Fixnum(i64),
    Symbol(String),
    /// A heap object (string, array, nested method, ...) owned by the
    /// runtime; compiled code loads it from the literal tuple at run time.
    Object(String),
    GlobalCache(Arc<GlobalCacheEntry>),
}

impl Literal {
    /// The object word for literals that can be embedded directly in code.
    pub fn immediate(&self) -> Option<i64> {
        match self {
            Literal::Nil => Some(value::Q_NIL),
            Literal::True => Some(value::Q_TRUE),
            Literal::False => Some(value::Q_FALSE),
            Literal::Fixnum(v) => value::fixnum(*v),
            Literal::Symbol(name) => Some(symbol::intern(name).word()),
            Literal::Object(_) | Literal::GlobalCache(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<symbol::Symbol> {
        match self {
            Literal::Symbol(name) => Some(symbol::intern(name)),
            _ => None,
        }
    }
}

/// One method's bytecode plus the side tables its instructions index into.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    pub name: String,
    pub code: Vec<Instruction>,
    pub literals: Vec<Literal>,
    pub caches: Vec<Arc<InlineCache>>,
    /// Maximum operand stack depth.
    pub stack_size: usize,
    pub local_count: usize,
    /// Number of positional arguments the method requires.
    pub required_args: usize,
}

impl CompiledMethod {
    pub fn new(name: impl Into<String>, code: Vec<Instruction>) -> Self {
        Self {
            name: name.into(),
            code,
            literals: Vec::new(),
            caches: Vec::new(),
            stack_size: 8,
            local_count: 0,
            required_args: 0,
        }
    }

    pub fn with_literals(mut self, literals: Vec<Literal>) -> Self {
        self.literals = literals;
        self
    }

    pub fn with_caches(mut self, caches: Vec<Arc<InlineCache>>) -> Self {
        self.caches = caches;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_locals(mut self, local_count: usize, required_args: usize) -> Self {
        self.local_count = local_count.max(required_args);
        self.required_args = required_args;
        self
    }

    /// Instructions paired with their ips.
    pub fn instructions(&self) -> impl Iterator<Item = (usize, &Instruction)> + '_ {
        self.code.iter().scan(0usize, |ip, instr| {
            let at = *ip;
            *ip += instr.width();
            Some((at, instr))
        })
    }

    /// Total code size in words; also the ip one past the last instruction.
    pub fn code_size(&self) -> usize {
        self.code.iter().map(Instruction::width).sum()
    }

    /// Instruction at `ip`, if an instruction starts there.
    pub fn instruction_at(&self, ip: usize) -> Option<&Instruction> {
        self.instructions().find(|(at, _)| *at == ip).map(|(_, instr)| instr)
    }

    pub fn literal(&self, index: u32) -> Option<&Literal> {
        self.literals.get(index as usize)
    }

    pub fn cache(&self, index: u32) -> Option<&Arc<InlineCache>> {
        self.caches.get(index as usize)
    }

    /// Whether every instruction, and every literal those instructions embed,
    /// stays valid when translated inside another method's frame.
    pub fn is_inlinable(&self) -> bool {
        self.instructions().all(|(_, instr)| {
            instr.is_inlinable()
                && match instr {
                    Instruction::PushLiteral { literal } => {
                        self.literal(*literal).and_then(Literal::immediate).is_some()
                    }
                    Instruction::PushIvar { name } | Instruction::SetIvar { name } => {
                        self.literal(*name).and_then(Literal::as_symbol).is_some()
                    }
                    _ => true,
                }
        })
    }
}
