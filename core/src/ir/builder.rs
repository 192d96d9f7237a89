use std::collections::BTreeSet;

use crate::rt::RuntimeHelper;

use super::{
    BinaryOp, Block, BlockId, Callee, CastOp, Function, IcmpPred, Inst, InstKind, Intrinsic, Operand, Terminator, Ty,
    ValueId, ValueInfo,
};

/// Appends instructions to a [`Function`] one block at a time.
///
/// Like an LLVM `IRBuilder`, it has an insertion block that new instructions
/// go into; blocks may be created ahead of time and filled later.
pub struct IrBuilder {
    function: Function,
    current: BlockId,
}

impl IrBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let entry = Block {
            id: BlockId::entry(),
            label: "entry".to_string(),
            insts: Vec::new(),
            terminator: None,
        };
        Self {
            function: Function {
                name: name.into(),
                blocks: vec![entry],
                layout: vec![BlockId::entry()],
                values: Vec::new(),
                helpers: BTreeSet::new(),
                intrinsics: BTreeSet::new(),
            },
            current: BlockId::entry(),
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    /// Seal the function. Blocks left without a terminator cannot be reached
    /// by any edge the translator emitted and become `unreachable`.
    pub fn finish(mut self) -> Function {
        for block in &mut self.function.blocks {
            if block.terminator.is_none() {
                block.terminator = Some(Terminator::Unreachable);
            }
        }
        self.function
    }

    pub fn new_block(&mut self, hint: &str) -> BlockId {
        let id = BlockId::new(self.function.blocks.len());
        self.function.blocks.push(Block {
            id,
            label: format!("{hint}.{}", id.index()),
            insts: Vec::new(),
            terminator: None,
        });
        self.function.layout.push(id);
        id
    }

    pub fn current(&self) -> BlockId {
        self.current
    }

    pub fn set_block(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Lay `block` out directly after `after`. The entry block stays first.
    pub fn move_after(&mut self, block: BlockId, after: BlockId) {
        if block == after || block == BlockId::entry() {
            return;
        }
        self.function.layout.retain(|id| *id != block);
        let pos = self
            .function
            .layout
            .iter()
            .position(|id| *id == after)
            .map(|p| p + 1)
            .unwrap_or(self.function.layout.len());
        self.function.layout.insert(pos, block);
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.function
            .block(block)
            .map(|b| b.terminator.is_some())
            .unwrap_or(true)
    }

    pub fn current_is_terminated(&self) -> bool {
        self.is_terminated(self.current)
    }

    fn fresh(&mut self, ty: Ty, hint: &'static str) -> ValueId {
        let id = ValueId::new(self.function.values.len());
        self.function.values.push(ValueInfo { ty, hint });
        id
    }

    fn insert(&mut self, block: BlockId, inst: Inst) {
        if let Some(b) = self.function.blocks.get_mut(block.index()) {
            b.insts.push(inst);
        }
    }

    fn emit(&mut self, ty: Ty, hint: &'static str, kind: InstKind) -> ValueId {
        let id = self.fresh(ty, hint);
        let block = self.current;
        self.insert(
            block,
            Inst {
                result: Some(id),
                kind,
            },
        );
        id
    }

    fn emit_void(&mut self, kind: InstKind) {
        let block = self.current;
        self.insert(block, Inst { result: None, kind });
    }

    /// Reserve `count` words of frame storage. Allocations always live in
    /// the entry block so they dominate every use.
    pub fn entry_alloca(&mut self, count: u32, hint: &'static str) -> ValueId {
        let id = self.fresh(Ty::Ptr, hint);
        let entry = &mut self.function.blocks[BlockId::entry().index()];
        let at = entry
            .insts
            .iter()
            .position(|inst| !matches!(inst.kind, InstKind::Alloca { .. }))
            .unwrap_or(entry.insts.len());
        entry.insts.insert(
            at,
            Inst {
                result: Some(id),
                kind: InstKind::Alloca { count },
            },
        );
        id
    }

    pub fn element_ptr(&mut self, base: Operand, offset: i64, hint: &'static str) -> ValueId {
        self.emit(Ty::Ptr, hint, InstKind::ElementPtr { base, offset })
    }

    pub fn load(&mut self, ty: Ty, ptr: Operand, hint: &'static str) -> ValueId {
        self.emit(ty, hint, InstKind::Load { ty, ptr })
    }

    /// Load word `offset` of the record at `base`.
    pub fn load_field(&mut self, ty: Ty, base: Operand, offset: i64, hint: &'static str) -> ValueId {
        let ptr = if offset == 0 {
            base
        } else {
            self.element_ptr(base, offset, "field_pos").into()
        };
        self.load(ty, ptr, hint)
    }

    pub fn store(&mut self, value: Operand, ptr: Operand) {
        self.emit_void(InstKind::Store { value, ptr });
    }

    pub fn store_field(&mut self, value: Operand, base: Operand, offset: i64) {
        let ptr = if offset == 0 {
            base
        } else {
            self.element_ptr(base, offset, "field_pos").into()
        };
        self.store(value, ptr);
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand, hint: &'static str) -> ValueId {
        let ty = self.function.operand_ty(&lhs);
        self.emit(ty, hint, InstKind::Binary { op, lhs, rhs })
    }

    pub fn icmp(&mut self, pred: IcmpPred, lhs: Operand, rhs: Operand, hint: &'static str) -> ValueId {
        self.emit(Ty::I1, hint, InstKind::Icmp { pred, lhs, rhs })
    }

    pub fn select(&mut self, cond: Operand, then_value: Operand, else_value: Operand, hint: &'static str) -> ValueId {
        let ty = self.function.operand_ty(&then_value);
        self.emit(
            ty,
            hint,
            InstKind::Select {
                cond,
                then_value,
                else_value,
            },
        )
    }

    pub fn cast(&mut self, op: CastOp, value: Operand, to: Ty, hint: &'static str) -> ValueId {
        self.emit(to, hint, InstKind::Cast { op, value, to })
    }

    pub fn overflow(&mut self, intrinsic: Intrinsic, lhs: Operand, rhs: Operand, hint: &'static str) -> ValueId {
        self.function.intrinsics.insert(intrinsic);
        self.emit(Ty::Overflow, hint, InstKind::Overflow { intrinsic, lhs, rhs })
    }

    /// Field 0 (the wrapped result) or 1 (the overflow flag) of an
    /// [`Ty::Overflow`] aggregate.
    pub fn extract(&mut self, aggregate: Operand, index: u32, hint: &'static str) -> ValueId {
        let ty = if index == 0 { Ty::I63 } else { Ty::I1 };
        self.emit(ty, hint, InstKind::Extract { aggregate, index })
    }

    /// Call a value-returning runtime helper.
    pub fn call(&mut self, helper: RuntimeHelper, args: Vec<Operand>, hint: &'static str) -> ValueId {
        let (ret, _) = helper.signature();
        self.function.helpers.insert(helper);
        self.emit(
            ret,
            hint,
            InstKind::Call {
                callee: Callee::Helper(helper),
                ret,
                args,
            },
        )
    }

    /// Call a helper for its side effect only.
    pub fn call_void(&mut self, helper: RuntimeHelper, args: Vec<Operand>) {
        let (ret, _) = helper.signature();
        self.function.helpers.insert(helper);
        self.emit_void(InstKind::Call {
            callee: Callee::Helper(helper),
            ret,
            args,
        });
    }

    pub fn call_indirect(&mut self, target: Operand, ret: Ty, args: Vec<Operand>, hint: &'static str) -> ValueId {
        self.emit(
            ret,
            hint,
            InstKind::Call {
                callee: Callee::Indirect(target),
                ret,
                args,
            },
        )
    }

    /// Create a phi at the head of the current block.
    pub fn phi(&mut self, ty: Ty, incoming: Vec<(Operand, BlockId)>, hint: &'static str) -> ValueId {
        let id = self.fresh(ty, hint);
        let block = self.current;
        if let Some(b) = self.function.blocks.get_mut(block.index()) {
            let at = b
                .insts
                .iter()
                .position(|inst| !matches!(inst.kind, InstKind::Phi { .. }))
                .unwrap_or(b.insts.len());
            b.insts.insert(
                at,
                Inst {
                    result: Some(id),
                    kind: InstKind::Phi { ty, incoming },
                },
            );
        }
        id
    }

    /// Add an incoming edge to a phi created earlier.
    pub fn add_incoming(&mut self, phi: ValueId, value: Operand, from: BlockId) {
        let slot = self
            .function
            .blocks
            .iter_mut()
            .flat_map(|b| b.insts.iter_mut())
            .find(|inst| inst.result == Some(phi));
        if let Some(Inst {
            kind: InstKind::Phi { incoming, .. },
            ..
        }) = slot
        {
            incoming.push((value, from));
        }
    }

    fn terminate(&mut self, terminator: Terminator) {
        if let Some(b) = self.function.blocks.get_mut(self.current.index())
            && b.terminator.is_none()
        {
            b.terminator = Some(terminator);
        }
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br { target });
    }

    pub fn cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn ret(&mut self, value: Operand) {
        self.terminate(Terminator::Ret { value });
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }
}
