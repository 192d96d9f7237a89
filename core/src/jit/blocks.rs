use rustc_hash::{FxHashMap, FxHashSet};

use crate::bytecode::{CompiledMethod, Instruction};
use crate::ir::{BlockId, IrBuilder};

use super::error::{JitError, JitResult};

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockEntry {
    pub(crate) block: BlockId,
    /// Stack depth on entry; `None` until the first edge arrives.
    pub(crate) depth: Option<usize>,
}

/// IR blocks for every ip that something branches to.
pub(crate) struct BlockTable {
    by_ip: FxHashMap<usize, BlockEntry>,
    /// Entry depth of each target, as far as a forward walk from ip 0 sees it.
    inferred: FxHashMap<usize, usize>,
}

impl BlockTable {
    /// Create one block per distinct branch or handler target of `method`.
    pub(crate) fn scan(method: &CompiledMethod, b: &mut IrBuilder) -> JitResult<Self> {
        let starts: FxHashSet<usize> = method.instructions().map(|(ip, _)| ip).collect();
        let mut by_ip = FxHashMap::default();
        for (ip, instr) in method.instructions() {
            let Some(target) = instr.branch_target() else {
                continue;
            };
            if !starts.contains(&target) {
                return Err(JitError::InvalidBranchTarget { ip, target });
            }
            by_ip.entry(target).or_insert_with(|| BlockEntry {
                block: b.new_block(&format!("ip_{target}")),
                depth: None,
            });
        }
        let inferred = infer_depths(method, &by_ip);
        Ok(Self { by_ip, inferred })
    }

    /// Depth some path from the method entry carries into the target at `ip`.
    pub(crate) fn inferred_depth(&self, ip: usize) -> Option<usize> {
        self.inferred.get(&ip).copied()
    }

    pub(crate) fn get(&self, ip: usize) -> Option<BlockEntry> {
        self.by_ip.get(&ip).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_ip.len()
    }

    /// Record an edge into the block at `ip` carrying `depth` values. The
    /// first edge fixes the block's entry depth; later ones must agree.
    pub(crate) fn edge(&mut self, ip: usize, depth: usize) -> JitResult<BlockId> {
        let entry = self
            .by_ip
            .get_mut(&ip)
            .ok_or(JitError::InvalidBranchTarget { ip, target: ip })?;
        match entry.depth {
            None => entry.depth = Some(depth),
            Some(expected) if expected != depth => {
                return Err(JitError::StackDepthMismatch {
                    ip,
                    expected,
                    found: depth,
                });
            }
            Some(_) => {}
        }
        Ok(entry.block)
    }
}

/// Walk every path from ip 0 and note the stack depth each branch target is
/// first reached with. Paths stop at a terminator, at an ip already walked,
/// or on underflow; translation reports the errors.
fn infer_depths(
    method: &CompiledMethod,
    targets: &FxHashMap<usize, BlockEntry>,
) -> FxHashMap<usize, usize> {
    let code: FxHashMap<usize, (&Instruction, usize)> = method
        .instructions()
        .map(|(ip, instr)| (ip, (instr, ip + instr.width())))
        .collect();
    let mut seen = FxHashSet::default();
    let mut depths = FxHashMap::default();
    let mut work = vec![(0usize, 0usize)];

    while let Some((mut ip, mut depth)) = work.pop() {
        while let Some(&(instr, next)) = code.get(&ip) {
            if !seen.insert(ip) {
                break;
            }
            if targets.contains_key(&ip) {
                depths.entry(ip).or_insert(depth);
            }
            let (pops, pushes) = instr.stack_effect();
            let Some(rest) = depth.checked_sub(pops) else {
                break;
            };
            depth = rest + pushes;
            // Conditional jumps leave with their condition already popped.
            if let Some(target) = instr.branch_target() {
                work.push((target, depth));
            }
            if instr.ends_block() {
                break;
            }
            ip = next;
        }
    }
    depths
}
