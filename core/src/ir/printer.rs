//! Textual LLVM IR rendering.

use super::{BlockId, Callee, CastOp, Function, Inst, InstKind, Operand, Param, Terminator, Ty};

/// Module-level settings for [`render_module`].
#[derive(Debug, Clone, Default)]
pub struct ModuleHeader<'a> {
    pub module_name: &'a str,
    pub target_triple: Option<&'a str>,
}

/// Render `function` as a complete module: header, helper declarations and
/// the function definition.
pub fn render_module(function: &Function, header: &ModuleHeader<'_>) -> String {
    let mut module = String::new();
    module.push_str(&format!("; ModuleID = '{}'\n", header.module_name));
    module.push_str(&format!("source_filename = \"{}\"\n", header.module_name));
    if let Some(triple) = header.target_triple {
        let escaped_triple = triple.replace('"', "\\\"");
        module.push_str(&format!("target triple = \"{}\"\n", escaped_triple));
    }
    module.push('\n');

    for helper in &function.helpers {
        let (ret, params) = helper.signature();
        let params: Vec<&str> = params.iter().map(|ty| ty.llvm()).collect();
        module.push_str(&format!(
            "declare {} @{}({})\n",
            ret.llvm(),
            helper.symbol(),
            params.join(", ")
        ));
    }
    for intrinsic in &function.intrinsics {
        module.push_str(&format!(
            "declare {} @{}(i63, i63)\n",
            Ty::Overflow.llvm(),
            intrinsic.symbol()
        ));
    }
    if !function.helpers.is_empty() || !function.intrinsics.is_empty() {
        module.push('\n');
    }

    module.push_str(&render_function(function));
    module
}

pub fn render_function(function: &Function) -> String {
    let printer = Printer { function };
    let mut writer = IrWriter::new();
    let params: Vec<String> = Param::ALL.iter().map(|p| format!("ptr %{}", p.name())).collect();
    writer.line(format!(
        "define i64 {}({}) {{",
        global_name(&function.name),
        params.join(", ")
    ));
    for (i, block) in function.ordered_blocks().enumerate() {
        if i > 0 {
            writer.line("");
        }
        writer.raw_line(format!("{}:", block.label));
        writer.indent();
        for inst in &block.insts {
            writer.line(printer.inst(inst));
        }
        match &block.terminator {
            Some(term) => writer.line(printer.terminator(term)),
            None => writer.line("unreachable"),
        }
        writer.dedent();
    }
    writer.raw_line("}");
    writer.finish()
}

fn global_name(name: &str) -> String {
    let plain = name
        .chars()
        .enumerate()
        .all(|(i, c)| c.is_ascii_alphabetic() || matches!(c, '$' | '.' | '_') || (i > 0 && c.is_ascii_digit()));
    if plain && !name.is_empty() {
        format!("@{name}")
    } else {
        format!("@\"{}\"", name.replace('"', "\\22"))
    }
}

struct Printer<'f> {
    function: &'f Function,
}

impl Printer<'_> {
    fn label(&self, block: BlockId) -> String {
        match self.function.block(block) {
            Some(b) => format!("%{}", b.label),
            None => format!("%missing.{}", block.index()),
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Value(id) => {
                let hint = self.function.values.get(id.index()).map(|v| v.hint).unwrap_or("v");
                format!("%{hint}.{}", id.index())
            }
            Operand::Param(p) => format!("%{}", p.name()),
            Operand::Const(Ty::Ptr, 0) => "null".to_string(),
            Operand::Const(Ty::Ptr, addr) => format!("inttoptr (i64 {addr} to ptr)"),
            Operand::Const(Ty::I1, v) => if *v != 0 { "true" } else { "false" }.to_string(),
            Operand::Const(_, v) => v.to_string(),
        }
    }

    fn typed(&self, operand: &Operand) -> String {
        format!("{} {}", self.function.operand_ty(operand).llvm(), self.operand(operand))
    }

    fn inst(&self, inst: &Inst) -> String {
        let body = self.inst_body(&inst.kind);
        match inst.result {
            Some(id) => format!("{} = {}", self.operand(&Operand::Value(id)), body),
            None => body,
        }
    }

    fn inst_body(&self, kind: &InstKind) -> String {
        match kind {
            InstKind::Alloca { count } => format!("alloca i64, i32 {count}"),
            InstKind::ElementPtr { base, offset } => {
                format!("getelementptr i64, ptr {}, i64 {offset}", self.operand(base))
            }
            InstKind::Load { ty, ptr } => format!("load {}, ptr {}", ty.llvm(), self.operand(ptr)),
            InstKind::Store { value, ptr } => format!("store {}, ptr {}", self.typed(value), self.operand(ptr)),
            InstKind::Binary { op, lhs, rhs } => {
                format!("{} {}, {}", op.llvm(), self.typed(lhs), self.operand(rhs))
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                format!("icmp {} {}, {}", pred.llvm(), self.typed(lhs), self.operand(rhs))
            }
            InstKind::Select {
                cond,
                then_value,
                else_value,
            } => format!(
                "select {}, {}, {}",
                self.typed(cond),
                self.typed(then_value),
                self.typed(else_value)
            ),
            InstKind::Cast { op, value, to } => {
                let name = match op {
                    CastOp::Trunc => "trunc",
                    CastOp::SExt => "sext",
                    CastOp::IntToPtr => "inttoptr",
                };
                format!("{name} {} to {}", self.typed(value), to.llvm())
            }
            InstKind::Overflow { intrinsic, lhs, rhs } => format!(
                "call {} @{}({}, {})",
                Ty::Overflow.llvm(),
                intrinsic.symbol(),
                self.typed(lhs),
                self.typed(rhs)
            ),
            InstKind::Extract { aggregate, index } => {
                format!("extractvalue {}, {index}", self.typed(aggregate))
            }
            InstKind::Call { callee, ret, args } => {
                let (target, param_tys) = match callee {
                    Callee::Helper(helper) => (format!("@{}", helper.symbol()), Some(helper.signature().1)),
                    Callee::Indirect(ptr) => (self.operand(ptr), None),
                };
                let rendered: Vec<String> = args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| match param_tys.and_then(|tys| tys.get(i)) {
                        Some(ty) => format!("{} {}", ty.llvm(), self.operand(arg)),
                        None => self.typed(arg),
                    })
                    .collect();
                format!("call {} {}({})", ret.llvm(), target, rendered.join(", "))
            }
            InstKind::Phi { ty, incoming } => {
                let edges: Vec<String> = incoming
                    .iter()
                    .map(|(value, from)| format!("[ {}, {} ]", self.operand(value), self.label(*from)))
                    .collect();
                format!("phi {} {}", ty.llvm(), edges.join(", "))
            }
        }
    }

    fn terminator(&self, term: &Terminator) -> String {
        match term {
            Terminator::Br { target } => format!("br label {}", self.label(*target)),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => format!(
                "br {}, label {}, label {}",
                self.typed(cond),
                self.label(*then_block),
                self.label(*else_block)
            ),
            Terminator::Ret { value } => format!("ret i64 {}", self.operand(value)),
            Terminator::Unreachable => "unreachable".to_string(),
        }
    }
}

struct IrWriter {
    buf: String,
    indent: usize,
}

impl IrWriter {
    fn new() -> Self {
        Self {
            buf: String::new(),
            indent: 0,
        }
    }

    fn indent(&mut self) {
        self.indent += 1;
    }

    fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    fn line<S: AsRef<str>>(&mut self, line: S) {
        let line = line.as_ref();
        if !line.is_empty() {
            for _ in 0..self.indent {
                self.buf.push_str("  ");
            }
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    fn raw_line<S: AsRef<str>>(&mut self, line: S) {
        self.buf.push_str(line.as_ref());
        self.buf.push('\n');
    }

    fn finish(self) -> String {
        self.buf
    }
}
